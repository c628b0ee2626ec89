use chrono::{DateTime, NaiveDate, TimeZone, Timelike};
use std::num::NonZeroUsize;

/// A policy narrowing an ordered capture-timestamp sequence down to the
/// frames a timelapse should contain.
///
/// Selection is pure: no hidden state, safe to reuse across invocations.
/// Every variant maps an empty input to an empty output. Composition is a
/// plain tagged variant rather than boxed closures so selectors stay
/// `Clone`, comparable and printable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameSelector {
    /// Keep every frame. The default.
    All,
    /// Per local calendar day, keep at most the first `frames` entries
    /// whose local hour equals `hour`. Days without a match contribute
    /// nothing.
    Daily { hour: u32, frames: NonZeroUsize },
    /// Keep every `step`-th frame starting from the first. A zero stride
    /// is unrepresentable.
    Skip { step: NonZeroUsize },
    /// Left-to-right sequential composition.
    Pipeline(Vec<FrameSelector>),
}

impl Default for FrameSelector {
    fn default() -> Self {
        Self::All
    }
}

impl FrameSelector {
    pub fn daily(hour: u32, frames: NonZeroUsize) -> Self {
        Self::Daily { hour, frames }
    }

    pub fn skip(step: NonZeroUsize) -> Self {
        Self::Skip { step }
    }

    pub fn pipeline<I: IntoIterator<Item = FrameSelector>>(selectors: I) -> Self {
        Self::Pipeline(selectors.into_iter().collect())
    }

    /// Apply this selector to a chronologically ordered timestamp
    /// sequence. Relative order of the survivors is preserved.
    pub fn select<T: TimeZone>(&self, frames: Vec<DateTime<T>>) -> Vec<DateTime<T>> {
        match self {
            Self::All => frames,
            Self::Daily { hour, frames: per_day } => {
                let mut kept = Vec::new();
                let mut current_day: Option<NaiveDate> = None;
                let mut taken = 0usize;
                for ts in frames {
                    let day = ts.date_naive();
                    if current_day != Some(day) {
                        current_day = Some(day);
                        taken = 0;
                    }
                    if ts.hour() == *hour && taken < per_day.get() {
                        kept.push(ts);
                        taken += 1;
                    }
                }
                kept
            }
            Self::Skip { step } => frames.into_iter().step_by(step.get()).collect(),
            Self::Pipeline(selectors) => selectors
                .iter()
                .fold(frames, |acc, selector| selector.select(acc)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;
    use chrono_tz::America::St_Johns;
    use chrono_tz::Tz;

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn ts(day: u32, hour: u32, minute: u32) -> DateTime<Tz> {
        St_Johns
            .with_ymd_and_hms(2024, 3, day, hour, minute, 0)
            .unwrap()
    }

    /// Five days of hourly captures.
    fn hourly_week() -> Vec<DateTime<Tz>> {
        let mut frames = Vec::new();
        for day in 1..=5 {
            for hour in 0..24 {
                frames.push(ts(day, hour, 0));
            }
        }
        frames
    }

    #[test]
    fn test_all_is_identity() {
        let frames = hourly_week();
        assert_eq!(FrameSelector::All.select(frames.clone()), frames);
        assert_eq!(
            FrameSelector::All.select(Vec::<DateTime<Tz>>::new()),
            Vec::<DateTime<Tz>>::new()
        );
    }

    #[test]
    fn test_daily_caps_frames_per_day_at_the_requested_hour() {
        let selected = FrameSelector::daily(10, nz(3)).select(hourly_week());
        // One matching frame exists per day, so the cap of three is not hit.
        assert_eq!(selected.len(), 5);
        assert!(selected.iter().all(|ts| ts.hour() == 10));
        assert!(selected.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_daily_takes_the_first_n_matches_in_order() {
        let frames = vec![ts(1, 10, 0), ts(1, 10, 5), ts(1, 10, 10), ts(2, 10, 0)];
        let selected = FrameSelector::daily(10, nz(2)).select(frames);
        assert_eq!(selected, vec![ts(1, 10, 0), ts(1, 10, 5), ts(2, 10, 0)]);
    }

    #[test]
    fn test_daily_skips_days_without_the_hour() {
        let mut frames = hourly_week();
        frames.retain(|ts| !(ts.day() == 3 && ts.hour() == 10));
        let selected = FrameSelector::daily(10, nz(1)).select(frames);
        assert_eq!(selected.len(), 4);
        assert!(selected.iter().all(|ts| ts.day() != 3));
    }

    #[test]
    fn test_skip_strides_from_the_first_frame() {
        let frames = vec![ts(1, 0, 0), ts(1, 1, 0), ts(1, 2, 0), ts(1, 3, 0), ts(1, 4, 0)];
        let selected = FrameSelector::skip(nz(2)).select(frames);
        assert_eq!(selected, vec![ts(1, 0, 0), ts(1, 2, 0), ts(1, 4, 0)]);
    }

    #[test]
    fn test_skip_of_one_keeps_everything() {
        let frames = hourly_week();
        assert_eq!(FrameSelector::skip(nz(1)).select(frames.clone()), frames);
    }

    #[test]
    fn test_pipeline_is_sequential_composition() {
        let f = FrameSelector::daily(10, nz(3));
        let g = FrameSelector::skip(nz(2));
        let frames = hourly_week();

        let piped = FrameSelector::pipeline([f.clone(), g.clone()]).select(frames.clone());
        assert_eq!(piped, g.select(f.select(frames)));
    }

    #[test]
    fn test_empty_input_is_empty_output_for_every_variant() {
        let empty = Vec::<DateTime<Tz>>::new();
        for selector in [
            FrameSelector::All,
            FrameSelector::daily(10, nz(1)),
            FrameSelector::skip(nz(3)),
            FrameSelector::pipeline([FrameSelector::daily(10, nz(1)), FrameSelector::skip(nz(2))]),
        ] {
            assert!(selector.select(empty.clone()).is_empty());
        }
    }
}
