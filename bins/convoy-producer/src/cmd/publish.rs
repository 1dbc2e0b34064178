use std::time::Duration;

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use convoy_api::WireRecord;

use super::config::PublishArgs;
use super::domain::{simulate_truck, Rng};
use super::error::ProducerError;

/// Publish one telemetry reading per (truck, tick) to the stream, with the
/// truck id as partition key.
pub async fn run(args: &PublishArgs) -> Result<(), ProducerError> {
    let mut rng = Rng::new(args.seed);

    let mut stream = TcpStream::connect(&args.addr)
        .await
        .map_err(|e| ProducerError::Connect {
            addr: args.addr.clone(),
            source: e,
        })?;
    tracing::info!(
        addr = %args.addr,
        trucks = args.trucks,
        ticks = args.ticks,
        "connected to stream"
    );

    let mut tick: u64 = 0;
    loop {
        tick += 1;
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();

        for truck_id in 1..=args.trucks {
            let telemetry = simulate_truck(truck_id, &timestamp, &mut rng);
            let payload = serde_json::to_vec(&telemetry)?;
            let wire = WireRecord::from_payload(truck_id.to_string(), &payload);

            let mut line = serde_json::to_string(&wire)?;
            line.push('\n');
            stream.write_all(line.as_bytes()).await?;
        }
        tracing::info!(tick, trucks = args.trucks, %timestamp, "published tick");

        if args.ticks != 0 && tick >= args.ticks {
            break;
        }
        if args.interval_ms > 0 {
            tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
        }
    }

    stream.flush().await?;
    tracing::info!(ticks = tick, "producer finished");
    Ok(())
}
