use clap::Parser;
use grid_panels::config::toml_config::TomlConfig;
use grid_panels::utils::error::ErrorCategory;
use grid_panels::utils::{logger, validation::Validate};
use grid_panels::{
    CliConfig, CooperativeScheduler, HostEvent, HostServices, LocalEventBus, Panel, PanelEntry,
    PanelError, RecordingSurfaceHost, SessionRegistry, TextRenderAdapter, UserId,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn main() {
    let args = CliConfig::parse();

    let toml_config = match &args.config {
        Some(path) => match TomlConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("❌ Failed to load config file '{}': {}", path, e);
                eprintln!("💡 Make sure the file exists and is valid TOML format");
                std::process::exit(1);
            }
        },
        None => TomlConfig::default(),
    };

    // 初始化日誌
    if args.json_logs || toml_config.log_json() {
        logger::init_json_logger(toml_config.log_level());
    } else {
        logger::init_cli_logger(args.verbose, toml_config.log_level());
    }

    if let Err(e) = toml_config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    if let Err(e) = run(&args, &toml_config) {
        tracing::error!("❌ Demo failed: {} (Category: {:?})", e, e.category());
        eprintln!("❌ {}", e.user_friendly_message());
        let exit_code = match e.category() {
            ErrorCategory::Configuration => 1,
            ErrorCategory::Session | ErrorCategory::Host => 2,
            ErrorCategory::Render | ErrorCategory::Callback => 3,
            ErrorCategory::System => 4,
        };
        std::process::exit(exit_code);
    }
}

fn run(args: &CliConfig, toml_config: &TomlConfig) -> grid_panels::Result<()> {
    let mut session_config = toml_config.session_config()?;
    if let Some(period_ms) = args.period_ms {
        session_config.refresh.period = Duration::from_millis(period_ms);
        session_config.refresh.validate()?;
        tracing::info!("🔧 Refresh period overridden to {}ms", period_ms);
    }
    let refresh = session_config.refresh;

    let tasks = Arc::new(CooperativeScheduler::default());
    let events = Arc::new(LocalEventBus::new());
    let display = Arc::new(RecordingSurfaceHost::new());
    let host = HostServices::new(
        Arc::new(TextRenderAdapter::new(session_config.render.clone())),
        display.clone(),
        events.clone(),
        tasks.clone(),
    );
    let registry = SessionRegistry::new(host, session_config);

    let user = UserId::new(args.user.clone());
    let handle = registry.open(user.clone(), demo_panel()?)?;
    tracing::info!("✅ Session open on {} for {}", handle.surface_id, user);

    let first = tasks.ticks_for(refresh.initial_delay).max(1);
    let per_tick = tasks.ticks_for(refresh.period).max(1);
    tasks.advance(host_ticks_for_refreshes(first, per_tick, args.ticks));
    tracing::info!(
        "⏱️ Refresh ticks completed: {}",
        registry.tick_count(&user).unwrap_or(0)
    );

    if let Some(slot) = args.click {
        let event = events.dispatch(HostEvent::click(handle.surface_id, slot, user.clone()));
        tracing::info!("👆 Click on slot {} consumed: {}", slot, event.is_consumed());
    }

    if let Some(surface) = registry.surface(&user) {
        let json = serde_json::to_string_pretty(&surface).map_err(|e| PanelError::HostError {
            message: format!("failed to serialize surface: {}", e),
        })?;
        println!("{}", json);
    }

    if registry.is_open(&user) {
        display.close_view(&user);
        events.dispatch(HostEvent::close(handle.surface_id, user.clone()));
    }

    println!(
        "✅ Panel closed for {} (open sessions: {}, pending tasks: {}, listeners: {})",
        user,
        registry.len(),
        tasks.pending_tasks(),
        events.subscriber_count()
    );
    Ok(())
}

/// Host ticks needed for `refreshes` refresh passes: the first after the
/// initial delay, then one per period. Saturates for huge `--ticks` values.
fn host_ticks_for_refreshes(first: u64, per_tick: u64, refreshes: u64) -> u64 {
    match refreshes {
        0 => 0,
        n => first.saturating_add(per_tick.saturating_mul(n - 1)),
    }
}

fn demo_panel() -> grid_panels::Result<Panel> {
    let clicks = Arc::new(AtomicU32::new(0));
    let counter = clicks.clone();

    Panel::new(27, "&6Demo Panel")?
        .with_entry(
            PanelEntry::new("CLOCK", 4)
                .name("&eUptime")
                .lore(["&7Grows every refresh"])
                .on_tick(|ctx| {
                    let display = ctx.display_mut();
                    display.quantity = if display.quantity >= 64 { 1 } else { display.quantity + 1 };
                    Ok(())
                }),
        )?
        .with_entry(
            PanelEntry::new("EMERALD", 13)
                .name("&aClick me")
                .on_interact(move |ctx| {
                    let total = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    ctx.display_mut().lore = vec![format!("&7Clicked {} times", total)];
                    Ok(())
                }),
        )?
        .with_entry(
            PanelEntry::new("BARRIER", 22)
                .name("&cClose")
                .on_interact(|ctx| {
                    ctx.close_panel();
                    Ok(())
                }),
        )
        .map(|panel| {
            panel
                .on_open(|user| {
                    tracing::info!("👋 {} opened the demo panel", user);
                    Ok(())
                })
                .on_close(move |user| {
                    tracing::info!(
                        "👋 {} closed the demo panel after {} clicks",
                        user,
                        clicks.load(Ordering::SeqCst)
                    );
                    Ok(())
                })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_ticks_for_refreshes() {
        assert_eq!(host_ticks_for_refreshes(20, 20, 0), 0);
        assert_eq!(host_ticks_for_refreshes(20, 20, 1), 20);
        assert_eq!(host_ticks_for_refreshes(1, 20, 4), 61);
        assert_eq!(host_ticks_for_refreshes(20, 20, u64::MAX), u64::MAX);
        assert_eq!(host_ticks_for_refreshes(u64::MAX, 1, 2), u64::MAX);
    }
}
