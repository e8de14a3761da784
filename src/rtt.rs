// Round-trip latency measurement over the launcher connection
use log::{debug, info, warn};
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::core_rpc::client::RpcClient;
use crate::core_rpc::error::RpcError;

/// Whether the link is fit for a network-carried display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkQuality {
    Fast,
    Slow,
}

impl LinkQuality {
    pub fn classify(rtt_ms: f64, threshold_ms: f64) -> Self {
        if rtt_ms > threshold_ms {
            LinkQuality::Slow
        } else {
            LinkQuality::Fast
        }
    }
}

/// Average round-trip time of `count` pings, in milliseconds.
pub async fn determine_rtt<T>(client: &mut RpcClient<T>, count: u32) -> Result<f64, RpcError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let count = count.max(1);
    let mut total_ms = 0.0;
    for i in 0..count {
        let before = Instant::now();
        client.ping().await?;
        let elapsed = before.elapsed().as_secs_f64() * 1000.0;
        debug!("Ping {}/{}: {:.3} ms", i + 1, count, elapsed);
        total_ms += elapsed;
    }

    let rtt = total_ms / f64::from(count);
    info!("Average ping time: {:.3} ms", rtt);
    Ok(rtt)
}

/// Measures the link and reports how it compares to `threshold_ms`.
pub async fn assess_link<T>(
    client: &mut RpcClient<T>,
    count: u32,
    threshold_ms: f64,
) -> Result<LinkQuality, RpcError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let rtt = determine_rtt(client, count).await?;
    let quality = LinkQuality::classify(rtt, threshold_ms);
    match quality {
        LinkQuality::Slow => warn!("Connection is slower than {} ms", threshold_ms),
        LinkQuality::Fast => info!("Connection is faster than {} ms", threshold_ms),
    }
    Ok(quality)
}
