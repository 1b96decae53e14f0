use crossbeam_queue::ArrayQueue;
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use turntable_algo::telemetry::{Frame, RecordDecoder, Tag};

use crate::series::DataPoint;

/// State shared between the serial thread and the UI.
pub struct Link {
    pub points: ArrayQueue<DataPoint>,
    pub outgoing: ArrayQueue<String>,
    pub acks: AtomicU32,
    pub running: ArrayQueue<bool>,
}

impl Link {
    pub fn new(capacity: usize) -> Self {
        Self {
            points: ArrayQueue::new(capacity),
            outgoing: ArrayQueue::new(16),
            acks: AtomicU32::new(0),
            running: ArrayQueue::new(4),
        }
    }

    /// Routes one decoded frame received at `time` [s].
    pub fn accept(&self, frame: Frame, time: f64) {
        match frame {
            Frame::Record(record) if record.tag == Tag::Running => {
                self.running.force_push(record.payload != 0);
            }
            Frame::Record(record) => {
                // Drops the oldest point when the queue is full
                self.points.force_push(DataPoint::from_record(&record, time));
            }
            Frame::Ack => {
                self.acks.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

pub fn connect_and_read(
    link: Arc<Link>,
    port_name: &str,
    baud: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut port = serialport::new(port_name, baud)
        .timeout(Duration::from_millis(10))
        .open()?;

    let start = Instant::now();
    let mut decoder = RecordDecoder::new();
    let mut buf = [0u8; 256];

    loop {
        while let Some(line) = link.outgoing.pop() {
            port.write_all(line.as_bytes())?;
            port.write_all(b"\n")?;
        }

        let count = match port.read(&mut buf) {
            Ok(count) => count,
            Err(e) if e.kind() == ErrorKind::TimedOut => continue,
            Err(e) => {
                eprintln!("Error reading serial port: {:?}", e);
                thread::sleep(Duration::from_millis(10));
                continue;
            }
        };

        let time = start.elapsed().as_secs_f64();
        for byte in &buf[..count] {
            if let Some(frame) = decoder.push(*byte) {
                link.accept(frame, time);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turntable_algo::telemetry::Record;

    #[test]
    fn running_answers_stay_out_of_the_plot() {
        let link = Link::new(2);
        link.accept(Frame::Record(Record::running(true)), 0.1);
        link.accept(Frame::Ack, 0.2);
        link.accept(Frame::Record(Record::average(2395)), 0.3);

        assert_eq!(link.running.pop(), Some(true));
        assert_eq!(link.acks.load(Ordering::Relaxed), 1);
        assert_eq!(link.points.len(), 1);
        assert_eq!(link.points.pop().map(|p| p.tag), Some(Tag::Average));
    }

    #[test]
    fn full_queue_keeps_newest_points() {
        let link = Link::new(2);
        for micros in [2000, 2100, 2200] {
            link.accept(Frame::Record(Record::raw_duration(micros)), 0.0);
        }
        let values: Vec<f64> = std::iter::from_fn(|| link.points.pop().map(|p| p.value)).collect();
        assert_eq!(values, vec![2100.0, 2200.0]);
    }
}
