use time::macros::format_description;
use time::OffsetDateTime;

/// Hand positions of the analog clock, in degrees clockwise from twelve.
#[derive(Debug, Clone, PartialEq)]
pub struct ClockFace {
    pub hour: f32,
    pub minute: f32,
    pub second: f32,
    pub label: String,
}

impl ClockFace {
    pub fn at(now: OffsetDateTime) -> Self {
        let (h, m, s) = now.time().as_hms();
        let (h, m, s) = (f32::from(h % 12), f32::from(m), f32::from(s));
        let label = now
            .format(format_description!("[hour]:[minute]:[second]"))
            .unwrap_or_default();
        Self {
            hour: h * 30.0 + m * 0.5,
            minute: m * 6.0 + s * 0.1,
            second: s * 6.0,
            label,
        }
    }
}

/// Redraw gate for the clock: only a new second produces a new face.
#[derive(Debug, Clone, Default)]
pub struct ClockState {
    last_second: Option<i64>,
    face: Option<ClockFace>,
}

impl ClockState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&mut self, now: OffsetDateTime) -> Option<&ClockFace> {
        let second = now.unix_timestamp();
        if self.last_second == Some(second) {
            return None;
        }
        self.last_second = Some(second);
        self.face = Some(ClockFace::at(now));
        self.face.as_ref()
    }

    pub fn face(&self) -> Option<&ClockFace> {
        self.face.as_ref()
    }
}

/// Local wall-clock time, or UTC when the local offset cannot be determined.
pub fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}
