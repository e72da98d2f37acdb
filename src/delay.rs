//! Keystroke delay model
//!
//! Converts a words-per-minute target into a per-keystroke sleep using the
//! usual five-characters-per-word convention, then shapes it by character
//! context and optional random jitter.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Slowest supported typing speed
pub const MIN_WPM: u32 = 1;
/// Fastest supported typing speed
pub const MAX_WPM: u32 = 1000;

/// Characters per word used to turn WPM into keystrokes per minute
const CHARS_PER_WORD: f64 = 5.0;

/// Upper bound for either jitter limit (one hour)
pub const MAX_JITTER_MS: f64 = 3_600_000.0;

/// Multiplier for common letter pairs
pub const DIGRAPH_FACTOR: f64 = 0.8;
/// Multiplier after `.`, `!`, `?` and line breaks
pub const SENTENCE_END_FACTOR: f64 = 2.0;
/// Multiplier after `,`, `;` and `:`
pub const MINOR_PUNCTUATION_FACTOR: f64 = 1.5;

/// Most frequent English letter pairs, lowercase.
const DIGRAPHS: &[[char; 2]] = &[
    ['t', 'h'], ['h', 'e'], ['i', 'n'], ['e', 'r'], ['a', 'n'], ['r', 'e'],
    ['o', 'n'], ['a', 't'], ['e', 'n'], ['n', 'd'], ['t', 'i'], ['e', 's'],
    ['o', 'r'], ['t', 'e'], ['o', 'f'], ['e', 'd'], ['i', 's'], ['i', 't'],
    ['a', 'l'], ['a', 'r'], ['s', 't'], ['t', 'o'], ['n', 't'], ['n', 'g'],
    ['s', 'e'], ['h', 'a'], ['a', 's'], ['o', 'u'], ['i', 'o'], ['l', 'e'],
    ['v', 'e'], ['c', 'o'], ['m', 'e'], ['d', 'e'], ['h', 'i'], ['r', 'i'],
    ['r', 'o'], ['i', 'c'], ['n', 'e'], ['e', 'a'], ['r', 'a'], ['c', 'e'],
];

/// Clamp a requested speed into the supported range.
pub fn clamp_wpm(wpm: u32) -> u32 {
    wpm.clamp(MIN_WPM, MAX_WPM)
}

/// Seconds per keystroke for the given speed, before any shaping.
///
/// ```
/// use auto_typer::delay::base_delay_secs;
///
/// assert!((base_delay_secs(60) - 0.2).abs() < 1e-12);
/// ```
pub fn base_delay_secs(wpm: u32) -> f64 {
    60.0 / (f64::from(clamp_wpm(wpm)) * CHARS_PER_WORD)
}

/// Extra random delay added to every keystroke
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JitterConfig {
    /// Whether jitter is applied at all
    pub enabled: bool,
    /// Lower bound in milliseconds
    pub min_ms: f64,
    /// Upper bound in milliseconds
    pub max_ms: f64,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_ms: 100.0,
            max_ms: 1000.0,
        }
    }
}

impl JitterConfig {
    pub fn new(enabled: bool, min_ms: f64, max_ms: f64) -> Self {
        Self {
            enabled,
            min_ms,
            max_ms,
        }
        .clamped()
    }

    /// Force both bounds non-negative and `min_ms <= max_ms`.
    ///
    /// An inverted range raises `max_ms` up to `min_ms`. Non-finite bounds
    /// count as zero and both are capped at [`MAX_JITTER_MS`].
    pub fn clamped(self) -> Self {
        let finite = |v: f64| {
            if v.is_finite() {
                v.clamp(0.0, MAX_JITTER_MS)
            } else {
                0.0
            }
        };
        let min_ms = finite(self.min_ms);
        let max_ms = finite(self.max_ms).max(min_ms);
        Self {
            enabled: self.enabled,
            min_ms,
            max_ms,
        }
    }

    fn sample_secs<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if !self.enabled {
            return 0.0;
        }
        let ms = if self.max_ms > self.min_ms {
            rng.gen_range(self.min_ms..=self.max_ms)
        } else {
            self.min_ms
        };
        ms / 1000.0
    }
}

/// Character context for a single delay lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CharContext {
    /// Last character that was just emitted
    pub current: Option<char>,
    /// Character that will be emitted next, if any
    pub next: Option<char>,
}

impl CharContext {
    pub fn new(current: Option<char>, next: Option<char>) -> Self {
        Self { current, next }
    }

    /// Multiplier applied to the base delay for this context.
    pub fn multiplier(&self) -> f64 {
        match self.current {
            Some('.' | '!' | '?' | '\n') => SENTENCE_END_FACTOR,
            Some(',' | ';' | ':') => MINOR_PUNCTUATION_FACTOR,
            Some(c) if self.next.is_some_and(|n| is_digraph(c, n)) => DIGRAPH_FACTOR,
            _ => 1.0,
        }
    }
}

fn is_digraph(first: char, second: char) -> bool {
    let pair = [first.to_ascii_lowercase(), second.to_ascii_lowercase()];
    DIGRAPHS.contains(&pair)
}

/// Delay model for one typing session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelayModel {
    wpm: u32,
    jitter: JitterConfig,
    context_rules: bool,
}

impl DelayModel {
    pub fn new(wpm: u32, jitter: JitterConfig, context_rules: bool) -> Self {
        Self {
            wpm: clamp_wpm(wpm),
            jitter: jitter.clamped(),
            context_rules,
        }
    }

    pub fn wpm(&self) -> u32 {
        self.wpm
    }

    pub fn jitter(&self) -> JitterConfig {
        self.jitter
    }

    pub fn base_secs(&self) -> f64 {
        base_delay_secs(self.wpm)
    }

    /// Delay before the keystroke that follows `context.current`.
    pub fn delay(&self, context: CharContext) -> Duration {
        self.delay_with_rng(context, &mut rand::thread_rng())
    }

    /// Same as [`DelayModel::delay`] with a caller-supplied RNG.
    pub fn delay_with_rng<R: Rng + ?Sized>(&self, context: CharContext, rng: &mut R) -> Duration {
        let mut secs = self.base_secs();
        if self.context_rules {
            secs *= context.multiplier();
        }
        secs += self.jitter.sample_secs(rng);
        Duration::from_secs_f64(secs.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn secs(d: Duration) -> f64 {
        d.as_secs_f64()
    }

    #[test]
    fn base_delay_matches_formula() {
        assert!((base_delay_secs(60) - 0.2).abs() < 1e-12);
        assert!((base_delay_secs(120) - 0.1).abs() < 1e-12);
        assert!((base_delay_secs(1) - 12.0).abs() < 1e-12);
    }

    #[test]
    fn base_delay_positive_and_decreasing() {
        let mut last = f64::INFINITY;
        for wpm in MIN_WPM..=MAX_WPM {
            let d = base_delay_secs(wpm);
            assert!(d > 0.0);
            assert!(d < last, "delay must shrink as wpm grows ({wpm})");
            last = d;
        }
    }

    #[test]
    fn wpm_is_clamped() {
        assert_eq!(clamp_wpm(0), 1);
        assert_eq!(clamp_wpm(5000), 1000);
        assert_eq!(DelayModel::new(0, JitterConfig::default(), false).wpm(), 1);
        assert_eq!(base_delay_secs(0), base_delay_secs(1));
    }

    #[test]
    fn jitter_inverted_range_raises_max() {
        let j = JitterConfig::new(true, 300.0, 100.0);
        assert_eq!(j.min_ms, 300.0);
        assert_eq!(j.max_ms, 300.0);
    }

    #[test]
    fn jitter_negative_bounds_clamped_to_zero() {
        let j = JitterConfig::new(true, -5.0, -1.0);
        assert_eq!(j.min_ms, 0.0);
        assert_eq!(j.max_ms, 0.0);

        let j = JitterConfig::new(true, f64::NAN, 20.0);
        assert_eq!(j.min_ms, 0.0);
        assert_eq!(j.max_ms, 20.0);
    }

    #[test]
    fn jitter_samples_stay_in_range() {
        let model = DelayModel::new(60, JitterConfig::new(true, 50.0, 150.0), true);
        let ctx = CharContext::new(Some('x'), Some('q'));
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1000 {
            let d = secs(model.delay_with_rng(ctx, &mut rng));
            assert!(d >= 0.2 + 0.05 - 1e-9 && d <= 0.2 + 0.15 + 1e-9, "{d} out of range");
        }
    }

    #[test]
    fn jitter_with_equal_bounds_is_exact() {
        let model = DelayModel::new(60, JitterConfig::new(true, 40.0, 40.0), false);
        let d = secs(model.delay(CharContext::default()));
        assert!((d - 0.24).abs() < 1e-9);
    }

    #[test]
    fn disabled_jitter_adds_nothing() {
        let model = DelayModel::new(60, JitterConfig::new(false, 500.0, 900.0), false);
        let d = secs(model.delay(CharContext::new(Some('a'), None)));
        assert!((d - 0.2).abs() < 1e-9);
    }

    #[test]
    fn punctuation_slows_down() {
        let model = DelayModel::new(60, JitterConfig::default(), true);
        let bang = secs(model.delay(CharContext::new(Some('!'), None)));
        let comma = secs(model.delay(CharContext::new(Some(','), Some(' '))));
        assert!((bang - 0.4).abs() < 1e-9);
        assert!((comma - 0.3).abs() < 1e-9);
    }

    #[test]
    fn digraph_speeds_up_case_insensitive() {
        let ctx = CharContext::new(Some('T'), Some('h'));
        assert_eq!(ctx.multiplier(), DIGRAPH_FACTOR);
        assert_eq!(CharContext::new(Some('h'), Some('t')).multiplier(), 1.0);
        assert_eq!(CharContext::new(Some('t'), None).multiplier(), 1.0);
    }

    #[test]
    fn context_rules_off_gives_flat_delay() {
        let model = DelayModel::new(60, JitterConfig::default(), false);
        for ctx in [
            CharContext::new(Some('!'), None),
            CharContext::new(Some('t'), Some('h')),
            CharContext::new(Some('\n'), Some('a')),
        ] {
            assert!((secs(model.delay(ctx)) - 0.2).abs() < 1e-9);
        }
    }
}
