use std::fmt::Write;

use console::Term;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressState, ProgressStyle};

use crate::error::Result;
use crate::options::MapOptions;

const TEMPLATE: &str =
    "{prefix}{percent:>3}%|{wide_bar}| {pos}/{len} [{elapsed_precise}<{eta_precise}, {rate}]";

/// Progress display for one map call. Cheap to share between threads.
pub struct Progress {
    bar: Option<ProgressBar>,
    leave: bool,
}

impl Progress {
    pub fn hidden() -> Self {
        Self { bar: None, leave: false }
    }

    pub fn new(len: usize, opts: &MapOptions, leave: bool) -> Result<Self> {
        if opts.no_progress {
            return Ok(Self::hidden());
        }
        let target = if opts.force_terminal {
            ProgressDrawTarget::term_like(Box::new(Term::stderr()))
        } else {
            // hidden by indicatif when stderr is not a terminal
            ProgressDrawTarget::stderr()
        };
        Self::with_draw_target(len, opts, leave, target)
    }

    pub(crate) fn with_draw_target(
        len: usize,
        opts: &MapOptions,
        leave: bool,
        target: ProgressDrawTarget,
    ) -> Result<Self> {
        let unit = opts.unit.clone();
        let style = ProgressStyle::with_template(TEMPLATE)?.with_key(
            "rate",
            move |state: &ProgressState, w: &mut dyn Write| {
                let _ = write!(w, "{:.2}{}/s", state.per_sec(), unit);
            },
        );
        let bar = ProgressBar::with_draw_target(Some(len as u64), target).with_style(style);
        if let Some(desc) = &opts.desc {
            bar.set_prefix(format!("{}: ", desc));
        }
        Ok(Self { bar: Some(bar), leave })
    }

    pub fn inc(&self) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }

    pub fn position(&self) -> u64 {
        self.bar.as_ref().map(|bar| bar.position()).unwrap_or(0)
    }

    pub fn is_hidden(&self) -> bool {
        self.bar.is_none()
    }

    pub fn finish(self) {
        if let Some(bar) = self.bar {
            if self.leave {
                bar.finish();
            } else {
                bar.finish_and_clear();
            }
        }
    }

    /// Stops the bar where it is after a failure.
    pub fn abandon(self) {
        if let Some(bar) = self.bar {
            if self.leave {
                bar.abandon();
            } else {
                bar.finish_and_clear();
            }
        }
    }
}

#[test]
fn test_no_progress_is_hidden() {
    let progress = Progress::new(10, &MapOptions::new().no_progress(true), true).unwrap();
    assert!(progress.is_hidden());
    progress.inc();
    assert_eq!(progress.position(), 0);
    progress.finish();
}

#[test]
fn test_counts_completed_items() {
    let progress =
        Progress::with_draw_target(3, &MapOptions::new(), true, ProgressDrawTarget::hidden())
            .unwrap();
    progress.inc();
    progress.inc();
    assert_eq!(progress.position(), 2);
}

#[test]
fn test_leave_renders_desc_and_unit() {
    use indicatif::InMemoryTerm;
    let term = InMemoryTerm::new(4, 100);
    let opts = MapOptions::new().desc("squares").unit("sq");
    let target = ProgressDrawTarget::term_like(Box::new(term.clone()));
    let progress = Progress::with_draw_target(3, &opts, true, target).unwrap();
    for _ in 0..3 {
        progress.inc();
    }
    progress.finish();
    let contents = term.contents();
    assert!(contents.starts_with("squares: 100%|"), "{}", contents);
    assert!(contents.contains("3/3"), "{}", contents);
    assert!(contents.contains("sq/s]"), "{}", contents);
}

#[test]
fn test_no_leave_clears_bar() {
    use indicatif::InMemoryTerm;
    let term = InMemoryTerm::new(4, 100);
    let target = ProgressDrawTarget::term_like(Box::new(term.clone()));
    let progress = Progress::with_draw_target(2, &MapOptions::new(), false, target).unwrap();
    progress.inc();
    progress.inc();
    progress.finish();
    assert_eq!(term.contents().trim(), "");
}
