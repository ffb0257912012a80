use anyhow::Result;
use aura_gateway::GatewayConfig;

fn main() -> Result<()> {
    let cfg = GatewayConfig::load()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(cfg.worker_threads.max(1))
        .enable_all()
        .build()?;
    runtime.block_on(aura_gateway::run(cfg))
}
