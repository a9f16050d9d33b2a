//! Kitchen Board - headless live order board
//!
//! 启动会话后按刷新间隔输出看板摘要，并从 stdin 读取员工操作：
//!
//! ```text
//! start A1 | complete A1 | serve A1 | advance A1
//! filter grill active
//! quit
//! ```

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use kitchen_board::utils::init_logger_with_file;
use kitchen_board::{
    BoardConfig, BoardFilter, BoardSession, BoardView, PushAdapter, StaffAction, StatusFilter, TcpConnector,
};
use tokio::io::{AsyncBufReadExt, BufReader};

enum Command {
    Action(StaffAction, String),
    Advance(String),
    Filter(BoardFilter),
    Quit,
}

fn parse_command(line: &str) -> Result<Command, String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    match parts.as_slice() {
        ["start", id] => Ok(Command::Action(StaffAction::Start, id.to_string())),
        ["complete", id] => Ok(Command::Action(StaffAction::Complete, id.to_string())),
        ["serve", id] => Ok(Command::Action(StaffAction::Serve, id.to_string())),
        ["advance", id] => Ok(Command::Advance(id.to_string())),
        ["filter", station, status] => Ok(Command::Filter(BoardFilter::new(*station, status.parse::<StatusFilter>()?))),
        ["quit"] | ["exit"] => Ok(Command::Quit),
        _ => Err(format!("Unknown command: {}", line.trim())),
    }
}

/// Changes whenever the rendered summary would change
fn summary_key(view: &BoardView) -> (u64, usize, usize) {
    let escalated = view.orders.iter().filter(|c| c.urgency.is_escalated).count();
    let critical = view.orders.iter().filter(|c| c.urgency.is_critical).count();
    (view.revision, escalated, critical)
}

fn render(view: &BoardView) {
    let (_, escalated, critical) = summary_key(view);
    let rail: Vec<String> = view
        .rail
        .iter()
        .map(|c| format!("#{}({}m)", c.order.order_number, c.urgency.elapsed_minutes))
        .collect();

    tracing::info!(
        revision = view.revision,
        connectivity = %view.connectivity,
        station = ?view.filter.station,
        status = %view.filter.status,
        shown = view.orders.len(),
        escalated,
        critical,
        rail = ?rail,
        stations = ?view.stations,
        "Board"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let config = BoardConfig::from_env();
    init_logger_with_file(&config.log_level, config.log_json, config.log_dir.as_deref())?;

    tracing::info!(
        store = %config.store_base_url,
        push = ?config.push_tcp_addr,
        poll_policy = %config.poll_policy,
        poll_interval_ms = config.poll_interval_ms,
        "Starting kitchen board"
    );

    let store = config
        .client_config()
        .build_http_client()
        .context("Invalid order store configuration")?;

    let push = config.push_tcp_addr.as_deref().map(|addr| {
        let connector = TcpConnector::new(addr, &config.client_name, &config.push_topic)
            .with_config(config.message_config());
        PushAdapter::new(connector, &config.push_topic, config.message_config())
    });

    let session = BoardSession::start(&config, Arc::new(store), push).await;

    let mut filter = config.filter();
    let mut ticker = tokio::time::interval(config.render_tick());
    let mut changes = session.subscribe_changes();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut last_summary = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C");
                break;
            }
            _ = ticker.tick() => {
                let view = session.view(&filter, Utc::now());
                // 数据和分级都没变时只在 debug 级别输出
                let key = summary_key(&view);
                if last_summary != Some(key) {
                    render(&view);
                    last_summary = Some(key);
                } else {
                    tracing::debug!(revision = view.revision, "Board unchanged");
                }
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                ticker.reset_immediately();
            }
            line = lines.next_line(), if stdin_open => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) | Err(_) => {
                        stdin_open = false;
                        continue;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Ok(Command::Quit) => break,
                    Ok(Command::Filter(next)) => {
                        filter = next;
                        last_summary = None;
                        ticker.reset_immediately();
                    }
                    // 提交在后台进行，乐观状态可立即刷新
                    Ok(Command::Action(action, id)) => {
                        let dispatcher = session.dispatcher().clone();
                        tokio::spawn(async move {
                            match dispatcher.request_action(&id, action).await {
                                Ok(outcome) => tracing::info!(order_id = %id, action = %action, outcome = ?outcome, "Action done"),
                                Err(e) => tracing::warn!(order_id = %id, action = %action, retryable = e.is_retryable(), error = %e, "Action failed"),
                            }
                        });
                    }
                    Ok(Command::Advance(id)) => {
                        let dispatcher = session.dispatcher().clone();
                        tokio::spawn(async move {
                            match dispatcher.advance(&id).await {
                                Ok(outcome) => tracing::info!(order_id = %id, outcome = ?outcome, "Advanced"),
                                Err(e) => tracing::warn!(order_id = %id, retryable = e.is_retryable(), error = %e, "Advance failed"),
                            }
                        });
                    }
                    Err(e) => tracing::warn!("{}", e),
                }
            }
        }
    }

    session.shutdown().await;
    tracing::info!("Kitchen board stopped");
    Ok(())
}
