//! Timeline construction for memory videos.
//!
//! A timeline is a list of still-image clips, each with a start offset, a
//! duration, fade lengths, and an animation law mapping local time to a
//! scale / rotation / position transform. Nothing here touches pixels.
//!
//! Each law is a [`Law`] value. The same value is evaluated by
//! [`AnimationKind::transform_at`] and printed as an FFmpeg expression by the
//! filter graph.

use std::f64::consts::PI;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Seconds each image is on screen for the sequential kinds.
pub const CLIP_DURATION: f64 = 4.0;

/// Cross-fade timings
pub const CROSS_FADE_HOLD: f64 = 2.0;
pub const CROSS_FADE_IN: f64 = 1.0;
pub const CROSS_FADE_OUT: f64 = 1.0;

pub const ZOOM_AMPLITUDE: f64 = 0.3;
pub const SPIRAL_SCALE_GROWTH: f64 = 0.3;
pub const KEN_BURNS_BASE_SCALE: f64 = 1.2;
pub const KEN_BURNS_SCALE_GROWTH: f64 = 0.3;
pub const KEN_BURNS_PAN_X: f64 = -100.0;
pub const KEN_BURNS_PAN_Y: f64 = -50.0;

/// A scalar function of a clip's local time `t` and length `d`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Law {
    Constant(f64),
    /// `base + gain * t / d`
    Ramp { base: f64, gain: f64 },
    /// `base + amplitude * sin(2π t / d)`
    Wave { base: f64, amplitude: f64 },
}

impl Law {
    pub fn eval(&self, t: f64, duration: f64) -> f64 {
        let progress = if duration > 0.0 { t / duration } else { 0.0 };
        match *self {
            Law::Constant(value) => value,
            Law::Ramp { base, gain } => base + gain * progress,
            Law::Wave { base, amplitude } => base + amplitude * (2.0 * PI * progress).sin(),
        }
    }

    /// The law as an FFmpeg expression; `t` is substituted verbatim for local time.
    pub fn expression(&self, t: &str, duration: f64) -> String {
        match *self {
            Law::Constant(value) => format!("{:.3}", value),
            Law::Ramp { base, gain } => {
                format!("{:.3}+({:.3})*({})/{:.3}", base, gain, t, duration)
            }
            Law::Wave { base, amplitude } => {
                format!("{:.3}+({:.3})*sin(2*PI*({})/{:.3})", base, amplitude, t, duration)
            }
        }
    }

    pub fn is_constant(&self, value: f64) -> bool {
        *self == Law::Constant(value)
    }
}

/// Every time-varying property of one animation kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    /// Multiplier on top of the fit-to-canvas scale
    pub scale: Law,
    pub rotation_deg: Law,
    /// Top-left offset in canvas pixels; `None` keeps the clip centred
    pub pan: Option<(Law, Law)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AnimationKind {
    #[default]
    CrossFade,
    Zoom,
    Spiral,
    KenBurns,
}

impl AnimationKind {
    pub const ALL: [AnimationKind; 4] = [
        AnimationKind::CrossFade,
        AnimationKind::Zoom,
        AnimationKind::Spiral,
        AnimationKind::KenBurns,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnimationKind::CrossFade => "cross_fade",
            AnimationKind::Zoom => "zoom",
            AnimationKind::Spiral => "spiral",
            AnimationKind::KenBurns => "ken_burns",
        }
    }

    /// Lenient parse: unknown names fall back to cross-fade.
    pub fn parse_or_default(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            tracing::warn!(animation = %name, "Unknown animation kind, using cross_fade");
            AnimationKind::CrossFade
        })
    }

    pub fn motion(&self) -> Motion {
        let still = Motion {
            scale: Law::Constant(1.0),
            rotation_deg: Law::Constant(0.0),
            pan: None,
        };
        match self {
            AnimationKind::CrossFade => still,
            AnimationKind::Zoom => Motion {
                scale: Law::Wave {
                    base: 1.0,
                    amplitude: ZOOM_AMPLITUDE,
                },
                ..still
            },
            AnimationKind::Spiral => Motion {
                scale: Law::Ramp {
                    base: 1.0,
                    gain: SPIRAL_SCALE_GROWTH,
                },
                rotation_deg: Law::Ramp {
                    base: 0.0,
                    gain: 360.0,
                },
                pan: None,
            },
            AnimationKind::KenBurns => Motion {
                scale: Law::Ramp {
                    base: KEN_BURNS_BASE_SCALE,
                    gain: KEN_BURNS_SCALE_GROWTH,
                },
                pan: Some((
                    Law::Ramp {
                        base: 0.0,
                        gain: KEN_BURNS_PAN_X,
                    },
                    Law::Ramp {
                        base: 0.0,
                        gain: KEN_BURNS_PAN_Y,
                    },
                )),
                ..still
            },
        }
    }

    /// Transform at local time `t` seconds into a clip of length `duration`.
    pub fn transform_at(&self, t: f64, duration: f64) -> Transform {
        let motion = self.motion();
        Transform {
            scale: motion.scale.eval(t, duration),
            rotation_deg: motion.rotation_deg.eval(t, duration),
            position: match motion.pan {
                Some((x, y)) => Position::Offset {
                    x: x.eval(t, duration),
                    y: y.eval(t, duration),
                },
                None => Position::Center,
            },
        }
    }
}

impl fmt::Display for AnimationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAnimation(pub String);

impl fmt::Display for UnknownAnimation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown animation kind: {}", self.0)
    }
}

impl std::error::Error for UnknownAnimation {}

impl FromStr for AnimationKind {
    type Err = UnknownAnimation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AnimationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownAnimation(s.to_string()))
    }
}

/// Where the clip sits on the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Position {
    Center,
    /// Top-left corner in canvas pixels
    Offset { x: f64, y: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Multiplier on top of the fit-to-canvas scale
    pub scale: f64,
    pub rotation_deg: f64,
    pub position: Position,
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            scale: 1.0,
            rotation_deg: 0.0,
            position: Position::Center,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Default for Canvas {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub source: PathBuf,
    /// Offset from the start of the video, seconds
    pub start: f64,
    pub duration: f64,
    pub fade_in: f64,
    pub fade_out: f64,
    pub kind: AnimationKind,
}

impl Clip {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    pub canvas: Canvas,
    pub kind: AnimationKind,
    pub clips: Vec<Clip>,
}

impl Timeline {
    /// Total length: the latest clip end.
    pub fn duration(&self) -> f64 {
        self.clips.iter().map(Clip::end).fold(0.0, f64::max)
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

/// Build a timeline showing `image_paths` in order with the given animation.
///
/// Cross-fade clips overlap their predecessor by half the fade-out; every
/// other kind plays clips back to back.
pub fn build(image_paths: &[PathBuf], kind: AnimationKind, canvas: Canvas) -> Timeline {
    let (duration, fade_in, fade_out, overlap) = match kind {
        AnimationKind::CrossFade => (
            CROSS_FADE_HOLD + CROSS_FADE_IN + CROSS_FADE_OUT,
            CROSS_FADE_IN,
            CROSS_FADE_OUT,
            CROSS_FADE_OUT / 2.0,
        ),
        _ => (CLIP_DURATION, 0.0, 0.0, 0.0),
    };

    let clips = image_paths
        .iter()
        .enumerate()
        .map(|(i, source)| Clip {
            source: source.clone(),
            start: i as f64 * (duration - overlap),
            duration,
            fade_in,
            fade_out,
            kind,
        })
        .collect();

    Timeline {
        canvas,
        kind,
        clips,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Evaluates the arithmetic subset FFmpeg expressions here are written in:
    /// numbers, `t`, `PI`, `sin(..)`, parentheses, unary minus and `+ - * /`.
    pub(crate) fn eval_expression(expr: &str, t: f64) -> f64 {
        let mut parser = ExprParser {
            src: expr.as_bytes(),
            pos: 0,
            t,
        };
        let value = parser.sum();
        assert_eq!(parser.pos, expr.len(), "trailing input in {}", expr);
        value
    }

    struct ExprParser<'a> {
        src: &'a [u8],
        pos: usize,
        t: f64,
    }

    impl ExprParser<'_> {
        fn eat(&mut self, token: &str) -> bool {
            if self.src[self.pos..].starts_with(token.as_bytes()) {
                self.pos += token.len();
                true
            } else {
                false
            }
        }

        fn sum(&mut self) -> f64 {
            let mut value = self.product();
            loop {
                if self.eat("+") {
                    value += self.product();
                } else if self.eat("-") {
                    value -= self.product();
                } else {
                    return value;
                }
            }
        }

        fn product(&mut self) -> f64 {
            let mut value = self.atom();
            loop {
                if self.eat("*") {
                    value *= self.atom();
                } else if self.eat("/") {
                    value /= self.atom();
                } else {
                    return value;
                }
            }
        }

        fn atom(&mut self) -> f64 {
            if self.eat("-") {
                return -self.atom();
            }
            if self.eat("(") {
                let value = self.sum();
                assert!(self.eat(")"), "unbalanced parentheses");
                return value;
            }
            if self.eat("sin(") {
                let value = self.sum();
                assert!(self.eat(")"), "unbalanced sin(");
                return value.sin();
            }
            if self.eat("PI") {
                return PI;
            }
            if self.eat("t") {
                return self.t;
            }
            let start = self.pos;
            while self.pos < self.src.len() && matches!(self.src[self.pos], b'0'..=b'9' | b'.') {
                self.pos += 1;
            }
            std::str::from_utf8(&self.src[start..self.pos])
                .unwrap()
                .parse()
                .unwrap_or_else(|_| panic!("bad number at {}", start))
        }
    }

    fn paths(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("img{}.jpg", i))).collect()
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_parse_animation_kind() {
        assert_eq!("ken_burns".parse::<AnimationKind>().unwrap(), AnimationKind::KenBurns);
        assert!("morph".parse::<AnimationKind>().is_err());
        assert_eq!(AnimationKind::parse_or_default("morph"), AnimationKind::CrossFade);
        assert_eq!(AnimationKind::parse_or_default("spiral"), AnimationKind::Spiral);
        assert_eq!(AnimationKind::default(), AnimationKind::CrossFade);
    }

    #[test]
    fn test_cross_fade_overlaps_by_half_fade_out() {
        let timeline = build(&paths(3), AnimationKind::CrossFade, Canvas::default());
        let overlap = CROSS_FADE_OUT / 2.0;

        assert_eq!(timeline.clips.len(), 3);
        assert!(approx(timeline.clips[1].start, 4.0 - overlap));
        assert!(approx(timeline.clips[2].start, 2.0 * (4.0 - overlap)));
        assert!(approx(timeline.duration(), 3.0 * 4.0 - 2.0 * overlap));
        assert!(timeline.clips.iter().all(|c| c.fade_in == 1.0 && c.fade_out == 1.0));
    }

    #[test]
    fn test_sequential_kinds_have_no_overlap() {
        for kind in [AnimationKind::Zoom, AnimationKind::Spiral, AnimationKind::KenBurns] {
            let timeline = build(&paths(3), kind, Canvas::default());
            assert!(approx(timeline.duration(), 12.0), "{} duration", kind);
            for pair in timeline.clips.windows(2) {
                assert!(approx(pair[0].end(), pair[1].start));
            }
        }
    }

    #[test]
    fn test_clip_order_follows_input() {
        let input = paths(4);
        let timeline = build(&input, AnimationKind::Zoom, Canvas::default());
        let sources: Vec<PathBuf> = timeline.clips.iter().map(|c| c.source.clone()).collect();
        assert_eq!(sources, input);
    }

    #[test]
    fn test_empty_input_gives_empty_timeline() {
        let timeline = build(&[], AnimationKind::CrossFade, Canvas::default());
        assert!(timeline.is_empty());
        assert_eq!(timeline.duration(), 0.0);
    }

    #[test]
    fn test_zoom_oscillates() {
        let kind = AnimationKind::Zoom;
        assert!(approx(kind.transform_at(0.0, 4.0).scale, 1.0));
        assert!(approx(kind.transform_at(1.0, 4.0).scale, 1.3));
        assert!(approx(kind.transform_at(3.0, 4.0).scale, 0.7));
        assert_eq!(kind.transform_at(1.0, 4.0).position, Position::Center);
    }

    #[test]
    fn test_spiral_turns_once_per_clip() {
        let kind = AnimationKind::Spiral;
        let mid = kind.transform_at(2.0, 4.0);
        assert!(approx(mid.rotation_deg, 180.0));
        assert!(approx(mid.scale, 1.15));
        assert!(approx(kind.transform_at(4.0, 4.0).rotation_deg, 360.0));
    }

    #[test]
    fn test_ken_burns_pans_and_zooms() {
        let end = AnimationKind::KenBurns.transform_at(4.0, 4.0);
        assert!(approx(end.scale, 1.5));
        assert_eq!(end.position, Position::Offset { x: -100.0, y: -50.0 });
    }

    #[test]
    fn test_cross_fade_is_static() {
        let kind = AnimationKind::CrossFade;
        for t in [0.0, 1.5, 4.0] {
            assert_eq!(kind.transform_at(t, 4.0), Transform::identity());
        }
        assert!(kind.motion().scale.is_constant(1.0));
        assert!(kind.motion().rotation_deg.is_constant(0.0));
    }

    #[test]
    fn test_expressions_match_transform() {
        let duration = 4.0;
        for kind in AnimationKind::ALL {
            let motion = kind.motion();
            for t in [0.0, 0.5, 1.0, 1.7, 2.0, 3.0, 3.9, 4.0] {
                let expected = kind.transform_at(t, duration);
                let scale = eval_expression(&motion.scale.expression("t", duration), t);
                let rotation = eval_expression(&motion.rotation_deg.expression("t", duration), t);
                assert!((scale - expected.scale).abs() < 1e-3, "{} scale at {}", kind, t);
                assert!((rotation - expected.rotation_deg).abs() < 1e-3, "{} rotation at {}", kind, t);

                match (motion.pan, expected.position) {
                    (Some((x, y)), Position::Offset { x: ex, y: ey }) => {
                        assert!((eval_expression(&x.expression("t", duration), t) - ex).abs() < 1e-3);
                        assert!((eval_expression(&y.expression("t", duration), t) - ey).abs() < 1e-3);
                    }
                    (None, Position::Center) => {}
                    other => panic!("{} position mismatch: {:?}", kind, other),
                }
            }
        }
    }

    #[test]
    fn test_eval_expression_handles_signs() {
        assert!(approx(eval_expression("0.000+(-100.000)*(t-4.000)/4.000", 6.0), -50.0));
        assert!(approx(eval_expression("-(2)*-3", 0.0), 6.0));
    }
}
