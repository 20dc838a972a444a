//! Per-connection line reader.
//!
//! Reads newline-terminated records and pushes each one onto the observation
//! queue, waiting while the queue is full. Records are forwarded raw;
//! decoding happens in the merge loop. A line that is not valid UTF-8 is
//! dropped with a warning and the connection keeps reading.

use std::time::Instant;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{info, warn};

use crate::error::ServerError;
use crate::queue::QueueProducer;
use crate::status::PipelineStatus;

/// Reads records from `stream` until end of stream. Returns the number of
/// records enqueued.
pub async fn read_records<R>(
    stream: R,
    handler: u64,
    queue: &QueueProducer,
    status: &PipelineStatus,
) -> Result<u64, ServerError>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    let mut records = 0u64;

    loop {
        buf.clear();
        let started = Instant::now();
        let read = reader.read_until(b'\n', &mut buf).await?;
        status.add_read_time(started.elapsed());
        if read == 0 {
            break;
        }

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(err) => {
                warn!(handler, error = %err, "dropping record with invalid UTF-8");
                continue;
            }
        };
        let line = line.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            continue;
        }

        queue.push(line.to_string()).await?;
        status.set_processing(true);
        records += 1;

        if let Some(rate) = status.record_read() {
            info!(handler, reads = status.reads(), per_second = rate.round() as u64, "throughput");
            let remaining = queue.remaining_capacity();
            if queue.len() > remaining {
                warn!(handler, remaining, "observation queue capacity is low");
            }
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::observation_queue;

    #[tokio::test]
    async fn test_reads_lines_in_order_and_skips_blank() {
        let (producer, mut consumer) = observation_queue(16);
        let status = PipelineStatus::new();
        let input: &[u8] = b"first\r\n\n   \nsecond\nthird";

        let count = read_records(input, 0, &producer, &status).await.unwrap();
        assert_eq!(count, 3);
        assert!(status.is_processing());
        assert_eq!(consumer.poll().as_deref(), Some("first"));
        assert_eq!(consumer.poll().as_deref(), Some("second"));
        assert_eq!(consumer.poll().as_deref(), Some("third"));
        assert!(consumer.poll().is_none());
    }

    #[tokio::test]
    async fn test_invalid_utf8_inside_type_name_is_dropped() {
        let (producer, mut consumer) = observation_queue(4);
        let status = PipelineStatus::new();
        let input: &[u8] = b"{\"receiver_name\":\"Foo\",\"method_name\":\"m\",\"args\":[{\"type\":\"In\xfft\"}],\"return_type_name\":\"String\"}\nab\xffcd\nnext\n";

        assert_eq!(read_records(input, 1, &producer, &status).await.unwrap(), 1);
        assert_eq!(consumer.poll().as_deref(), Some("next"));
        assert!(consumer.poll().is_none());
    }

    #[tokio::test]
    async fn test_empty_stream_leaves_flag_unset() {
        let (producer, _consumer) = observation_queue(4);
        let status = PipelineStatus::new();
        let input: &[u8] = b"";
        assert_eq!(read_records(input, 2, &producer, &status).await.unwrap(), 0);
        assert!(!status.is_processing());
    }

    #[tokio::test]
    async fn test_closed_queue_stops_reader() {
        let (producer, consumer) = observation_queue(4);
        drop(consumer);
        let status = PipelineStatus::new();
        let input: &[u8] = b"line\n";
        let result = read_records(input, 3, &producer, &status).await;
        assert!(matches!(result, Err(ServerError::QueueClosed)));
    }
}
