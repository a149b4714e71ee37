//! Liveness probe command: run the ready handshake from the command line.

use std::path::Path;

use anyhow::{Context, Result, bail};

use dreamgate::api::attrs;
use dreamgate::bridge::{BridgeConfig, check_ready};
use dreamgate::capability::Capability;
use dreamgate::config::Config;
use dreamgate::upstream::GrpcUpstream;

pub async fn run(config_path: &Path, capability: Option<&str>) -> Result<()> {
    let config = Config::load(config_path)
        .await
        .with_context(|| format!("failed to load config '{}'", config_path.display()))?;

    let capabilities = match capability {
        Some(name) => match Capability::from_name(name) {
            Some(capability) => vec![capability],
            None => bail!(
                "unknown capability '{name}' (expected one of: transcribe, translate, summarize, chat)"
            ),
        },
        None => Capability::ALL.to_vec(),
    };

    let upstream = GrpcUpstream::connect_lazy(config.upstream.address.clone())?;
    let timeout = config.upstream.probe_timeout();

    let mut failed = 0;
    for capability in capabilities {
        let event_type = config.upstream.event_type(capability);
        let probe = BridgeConfig::new(event_type)
            .with_attributes(config.upstream.default_attributes.clone())
            .with_attributes([(attrs::PROBE, "true")]);

        match check_ready(&upstream, probe, timeout).await {
            Ok(stream_id) => println!("{capability:<10} ok      ({event_type}, stream {stream_id})"),
            Err(e) => {
                failed += 1;
                println!("{capability:<10} FAILED  ({event_type}): {e}");
            }
        }
    }

    if failed > 0 {
        bail!(
            "{failed} capability probe(s) failed against {}",
            upstream.address()
        );
    }
    Ok(())
}
