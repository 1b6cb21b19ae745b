use std::fmt;

/// Pixels covered by one motor step with the stock optics.
pub const DEFAULT_STEP_SIZE_PX: u16 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    pub fn label(self) -> &'static str {
        match self {
            Axis::X => "x",
            Axis::Y => "y",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepDirection {
    Positive,
    Negative,
}

/// Pulses needed to cover one pixel delta.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepPlan {
    pub direction: StepDirection,
    pub steps: u32,
}

impl StepPlan {
    pub fn is_idle(&self) -> bool {
        self.steps == 0
    }
}

/// Turn a pixel delta into a direction and a whole number of steps.
///
/// A zero delta maps to the negative direction with no steps. A zero
/// `step_size_px` is treated as 1.
pub fn plan_move(delta_px: i32, step_size_px: u16) -> StepPlan {
    let direction = if delta_px <= 0 {
        StepDirection::Negative
    } else {
        StepDirection::Positive
    };
    StepPlan {
        direction,
        steps: delta_px.unsigned_abs() / u32::from(step_size_px.max(1)),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn sign_picks_direction() {
        assert_eq!(
            plan_move(10, 2),
            StepPlan {
                direction: StepDirection::Positive,
                steps: 5
            }
        );
        assert_eq!(
            plan_move(-7, 2),
            StepPlan {
                direction: StepDirection::Negative,
                steps: 3
            }
        );
        let idle = plan_move(0, 2);
        assert_eq!(idle.direction, StepDirection::Negative);
        assert!(idle.is_idle());
    }

    #[test]
    fn sub_step_deltas_do_not_move() {
        assert!(plan_move(1, 2).is_idle());
        assert!(plan_move(-1, 2).is_idle());
        assert_eq!(plan_move(1, 0).steps, 1);
    }

    proptest! {
        #[test]
        fn steps_never_overshoot(delta in -70_000i32..70_000, step in 1u16..16) {
            let plan = plan_move(delta, step);
            let covered = plan.steps as i64 * step as i64;
            prop_assert!(covered <= (delta as i64).abs());
            prop_assert!((delta as i64).abs() - covered < step as i64);
        }
    }
}
