//! Tasks shipped with the crate.
use std::thread::sleep;
use std::time::Duration;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::task::Task;

/// `x * x + offset`, the demonstration function of the `parmap` binary.
pub struct ShiftedSquare;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShiftedSquareArgs {
    pub offset: i64,
    /// Sleep before each item, makes the progress bar visible on small inputs.
    #[serde(default)]
    pub delay_ms: u64,
    /// Print each input to stdout, without a newline, before computing.
    #[serde(default)]
    pub echo: bool,
}

impl Task for ShiftedSquare {
    const NAME: &'static str = "shifted_square";
    type Input = i64;
    type Output = i64;
    type Args = ShiftedSquareArgs;

    fn call(x: i64, args: &ShiftedSquareArgs) -> anyhow::Result<i64> {
        if args.echo {
            print!("{} ", x);
        }
        if args.delay_ms > 0 {
            sleep(Duration::from_millis(args.delay_ms));
        }
        x.checked_mul(x)
            .and_then(|square| square.checked_add(args.offset))
            .ok_or_else(|| anyhow!("overflow computing {}^2 + {}", x, args.offset))
    }
}

#[test]
fn test_shifted_square() {
    let args = ShiftedSquareArgs { offset: -1, ..Default::default() };
    assert_eq!(ShiftedSquare::call(3, &args).unwrap(), 8);
    assert_eq!(ShiftedSquare::call(-2, &args).unwrap(), 3);
    assert!(ShiftedSquare::call(i64::MAX, &args).is_err());
}
