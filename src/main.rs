//! # stub-router 主程序
//!
//! 带桩能力的反向代理：命中桩时直接返回预置响应，否则转发到真实上游

use clap::Parser;
use stub_router::{
    Result,
    app::{AppContext, StubRouterServer},
    config::{CliArgs, ConfigManager},
    lerror, linfo,
    logging::{self, LogComponent, LogStage},
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    if args.logging_help {
        logging::print_logging_help();
        return Ok(());
    }

    // 初始化日志系统
    logging::init_logging(args.log_level.as_deref());

    linfo!("system", LogStage::Startup, LogComponent::Main, "service_starting", "服务启动");

    if let Err(e) = run(&args).await {
        lerror!(
            "system",
            LogStage::Startup,
            LogComponent::Main,
            "service_start_failed",
            &format!("服务启动失败: {e:?}")
        );
        std::process::exit(1);
    }

    linfo!("system", LogStage::Shutdown, LogComponent::Main, "service_shutdown", "服务正常关闭");
    Ok(())
}

async fn run(args: &CliArgs) -> Result<()> {
    let config = ConfigManager::load(args)?;
    let context = AppContext::from_config(config).await?;
    StubRouterServer::new(context).serve().await
}
