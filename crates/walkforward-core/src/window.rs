use tracing::{debug, warn};

use crate::models::{BacktestConfig, Fold, WindowType};

/// Plans the ordered (train, test) folds for a walk-forward run.
pub struct WindowPlanner;

impl WindowPlanner {
    /// Plan folds over a series of `series_len` bars.
    ///
    /// Test windows tile the series contiguously after the first train
    /// window. A shortened final fold is kept only if it still spans at
    /// least `require_min_trades` bars; anything smaller is dropped.
    ///
    /// Returns an empty plan when the series cannot hold one full fold;
    /// the engine treats an empty plan as fatal rather than running silently
    /// with zero folds.
    pub fn plan(series_len: usize, config: &BacktestConfig) -> Vec<Fold> {
        if series_len < config.min_train_size + config.test_window {
            return Vec::new();
        }

        let mut folds = Vec::new();
        let mut k = 0usize;
        loop {
            let (train_start, train_end) = match config.window_type {
                WindowType::Expanding => (0, config.min_train_size + k * config.test_window),
                WindowType::Rolling => (
                    k * config.test_window,
                    k * config.test_window + config.train_window,
                ),
            };
            if train_end >= series_len {
                break;
            }

            let test_start = train_end;
            let remaining = series_len - test_start;
            let test_len = remaining.min(config.test_window);
            if test_len < config.test_window && test_len < config.require_min_trades {
                warn!(fold = k, bars = test_len, "dropping final partial fold");
                break;
            }

            folds.push(Fold {
                fold_index: folds.len(),
                train_start,
                train_end,
                test_start,
                test_end: test_start + test_len,
            });
            if test_len < config.test_window {
                break;
            }
            k += 1;
        }

        debug!(folds = folds.len(), series_len, "planned walk-forward folds");
        folds
    }
}
