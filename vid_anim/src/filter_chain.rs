//! The `-vf` chain shared by every output format.

use crate::request::ConversionRequest;

/// Floor for the speed multiplier before it is inverted.
pub const SPEED_EPSILON: f64 = 0.001;

/// Motion-compensated interpolation settings used with `--interpolate`.
const MINTERPOLATE_PARAMS: &str = "mi_mode=mci:mc_mode=aobmc:me_mode=bidir:vsbmc=1";

/// `setpts` multiplier for a playback speedup of `speed`.
pub fn setpts_factor(speed: f64) -> f64 {
    1.0 / speed.max(SPEED_EPSILON)
}

/// `setpts` retime, frame-rate stage, SAR reset, then lanczos scale to the
/// requested width with an even auto height.
///
/// `fps=10` at 8x and 480 px gives
/// `setpts=0.125*PTS,fps=10,setsar=1,scale=480:-2:flags=lanczos`.
pub fn build_filter_chain(request: &ConversionRequest) -> String {
    let fps_stage = if request.interpolate {
        format!("minterpolate=fps={}:{}", request.fps, MINTERPOLATE_PARAMS)
    } else {
        format!("fps={}", request.fps)
    };
    format!(
        "setpts={}*PTS,{},setsar=1,scale={}:-2:flags=lanczos",
        setpts_factor(request.speed),
        fps_stage,
        request.width
    )
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Above the floor the factor is the exact reciprocal; below it, bounded.
        #[test]
        fn prop_setpts_factor(speed in 0.0f64..64.0) {
            let factor = setpts_factor(speed);
            prop_assert!(factor.is_finite());
            if speed >= SPEED_EPSILON {
                prop_assert_eq!(factor, 1.0 / speed);
            } else {
                prop_assert_eq!(factor, 1.0 / SPEED_EPSILON);
            }
        }

        /// Height is always the even-rounded auto value, whatever the width.
        #[test]
        fn prop_scale_height_is_auto_even(
            width in 1u32..4096,
            fps in 1u32..=60,
            speed in 0.5f64..32.0,
            interpolate in any::<bool>(),
        ) {
            let chain = build_filter_chain(&super::tests::request(width, fps, speed, interpolate));
            let expected_scale = format!("scale={}:-2:flags=lanczos", width);
            prop_assert!(chain.ends_with(&expected_scale));
            prop_assert_eq!(chain.matches("scale=").count(), 1);
        }
    }
}
