use crate::model::TempoPoint;
use keyline_ports::types::Seconds;

pub const DEFAULT_US_PER_QUARTER: u32 = 500_000;

/// Piecewise-constant tempo used to turn ticks into seconds.
#[derive(Clone, Debug)]
pub struct TempoMap {
    ppq: u16,
    segments: Vec<TempoSegment>,
}

#[derive(Clone, Copy, Debug)]
struct TempoSegment {
    start_tick: u64,
    start_us: u64,
    us_per_quarter: u32,
}

impl TempoMap {
    pub fn new(ppq: u16, mut points: Vec<TempoPoint>) -> Self {
        points.sort_by_key(|p| p.tick);
        if points.first().map_or(true, |p| p.tick != 0) {
            points.insert(
                0,
                TempoPoint {
                    tick: 0,
                    us_per_quarter: DEFAULT_US_PER_QUARTER,
                },
            );
        }
        let ppq = ppq.max(1);

        let mut segments: Vec<TempoSegment> = Vec::with_capacity(points.len());
        let mut current_us = 0u64;
        for (idx, point) in points.iter().enumerate() {
            if idx > 0 {
                let prev = &points[idx - 1];
                current_us += ticks_to_us(point.tick - prev.tick, prev.us_per_quarter, ppq);
            }
            // Later tempo events on the same tick win.
            if let Some(last) = segments.last_mut() {
                if last.start_tick == point.tick {
                    last.us_per_quarter = point.us_per_quarter;
                    continue;
                }
            }
            segments.push(TempoSegment {
                start_tick: point.tick,
                start_us: current_us,
                us_per_quarter: point.us_per_quarter,
            });
        }

        Self { ppq, segments }
    }

    pub fn ppq(&self) -> u16 {
        self.ppq
    }

    pub fn tick_to_micros(&self, tick: u64) -> u64 {
        let seg = self.segment_for_tick(tick);
        seg.start_us + ticks_to_us(tick - seg.start_tick, seg.us_per_quarter, self.ppq)
    }

    pub fn tick_to_seconds(&self, tick: u64) -> Seconds {
        self.tick_to_micros(tick) as f64 / 1_000_000.0
    }

    pub fn points(&self) -> Vec<TempoPoint> {
        self.segments
            .iter()
            .map(|seg| TempoPoint {
                tick: seg.start_tick,
                us_per_quarter: seg.us_per_quarter,
            })
            .collect()
    }

    fn segment_for_tick(&self, tick: u64) -> TempoSegment {
        let mut current = self.segments[0];
        for seg in &self.segments {
            if seg.start_tick > tick {
                break;
            }
            current = *seg;
        }
        current
    }
}

fn ticks_to_us(ticks: u64, us_per_quarter: u32, ppq: u16) -> u64 {
    let ticks = ticks as u128;
    let us_per_quarter = us_per_quarter as u128;
    let ppq = ppq as u128;
    ((ticks * us_per_quarter) / ppq) as u64
}
