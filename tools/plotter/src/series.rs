use std::io::{self, Write};

use turntable_algo::telemetry::{Record, Tag};

/// One decoded telemetry value, stamped with the host receive time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataPoint {
    pub tag: Tag,
    pub time: f64, // [s] since the link opened
    pub value: f64,
}

impl DataPoint {
    /// Converts a record to plot units: durations in microseconds, control as 0..1.
    pub fn from_record(record: &Record, time: f64) -> Self {
        let value = match record.tag {
            Tag::Control => record.control_output() as f64,
            _ => record.payload as f64,
        };
        Self {
            tag: record.tag,
            time,
            value,
        }
    }
}

pub const PLOTTED: [Tag; 3] = [Tag::RawDuration, Tag::Average, Tag::Control];

pub fn label(tag: Tag) -> &'static str {
    match tag {
        Tag::RawDuration => "raw [us]",
        Tag::Average => "average [us]",
        Tag::Control => "control",
        Tag::Running => "running",
    }
}

pub fn file_stem(tag: Tag) -> &'static str {
    match tag {
        Tag::RawDuration => "raw",
        Tag::Average => "average",
        Tag::Control => "control",
        Tag::Running => "running",
    }
}

/// Writes the points of one series as `time,value` lines.
pub fn write_csv<W: Write>(out: &mut W, tag: Tag, points: &[DataPoint]) -> io::Result<()> {
    writeln!(out, "time,{}", file_stem(tag))?;
    for point in points.iter().filter(|p| p.tag == tag) {
        writeln!(out, "{:.6},{}", point.time, point.value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_is_rescaled() {
        let point = DataPoint::from_record(&Record::control(0.25), 1.0);
        assert_eq!(point.value, 0.25);
        let point = DataPoint::from_record(&Record::average(2395), 1.0);
        assert_eq!(point.value, 2395.0);
    }

    #[test]
    fn csv_keeps_one_series() {
        let points = [
            DataPoint::from_record(&Record::average(2395), 0.5),
            DataPoint::from_record(&Record::raw_duration(2400), 0.6),
            DataPoint::from_record(&Record::average(2390), 1.5),
        ];
        let mut out = Vec::new();
        write_csv(&mut out, Tag::Average, &points).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "time,average\n0.500000,2395\n1.500000,2390\n"
        );
    }
}
