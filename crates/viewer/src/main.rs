mod app;
mod viewport;

// Re-export library modules so that `crate::engine`, `crate::state`, etc.
// resolve to the lib crate types everywhere in the binary.
pub use recon_viewer_lib::asset;
pub use recon_viewer_lib::engine;
pub use recon_viewer_lib::error;
pub use recon_viewer_lib::export;
pub use recon_viewer_lib::geometry;
pub use recon_viewer_lib::loader;
pub use recon_viewer_lib::state;
pub use recon_viewer_lib::task;

use app::ViewerApp;
use state::ViewerSettings;

/// Command line options
#[derive(Debug, Default, Clone)]
pub struct CliArgs {
    /// Task to poll on startup
    pub task: Option<String>,
    /// Model to open on startup (URL or local path)
    pub model: Option<String>,
    /// Backend base URL, overrides settings
    pub server: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "recon_viewer=info".into()),
        )
        .init();

    let args = parse_args();
    let mut settings = ViewerSettings::load();
    if let Some(server) = &args.server {
        settings.server.base_url = server.trim_end_matches('/').to_string();
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to start async runtime: {e}");
            return;
        }
    };

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Reconstruction Viewer")
            .with_inner_size([1400.0, 900.0])
            .with_min_inner_size([800.0, 500.0]),
        ..Default::default()
    };

    if let Err(e) = eframe::run_native(
        "recon-viewer",
        native_options,
        Box::new(move |cc| Ok(Box::new(ViewerApp::new(cc, runtime, settings, args)))),
    ) {
        tracing::error!("Failed to start application: {e}");
    }
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs::default();
    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1).cloned();
        match args[i].as_str() {
            "--task" if value.is_some() => {
                cli.task = value;
                i += 1;
            }
            "--model" if value.is_some() => {
                cli.model = value.map(|m| model_url(&m));
                i += 1;
            }
            "--server" if value.is_some() => {
                cli.server = value;
                i += 1;
            }
            other => tracing::warn!("Ignoring argument {other}"),
        }
        i += 1;
    }
    cli
}

/// Local paths become `file://` URLs so they are not resolved against the server
fn model_url(arg: &str) -> String {
    if arg.contains("://") {
        arg.to_string()
    } else {
        format!("file://{arg}")
    }
}
