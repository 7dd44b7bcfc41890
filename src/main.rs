//! desktop-updater host
//!
//! Drives a single UpdateCoordinator from the stored configuration and prints
//! results as JSON. Commands:
//! - check     query the registry for a newer release
//! - apply     check, then download and apply the latest release
//! - version   print the injected build version
//! - platform  print `<os>/<arch>`
//! - mode      print the repository, deployment mode and install path
//! - activate  swap a staged `<exe>.new` into place (optional exe path)

use std::path::PathBuf;
use std::sync::Arc;

use desktop_updater::auto_update::{self, ProgressListener};
use desktop_updater::{UpdateCoordinator, UpdateError, UpdateProgress};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize output: {}", e),
    }
}

fn usage() -> ! {
    eprintln!("Usage: desktop-updater <check|apply|version|platform|mode|activate [exe]>");
    std::process::exit(2);
}

fn fail(error: &UpdateError) -> ! {
    print_json(&UpdateProgress::from(error));
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    // Remove the image parked by a previous activation
    if let Ok(exe) = std::env::current_exe() {
        auto_update::cleanup_previous(&exe);
    }

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1) else { usage() };

    match command.as_str() {
        "version" => println!("{}", auto_update::CURRENT_VERSION),
        "platform" => println!("{}", auto_update::platform_info()),
        "activate" => {
            let exe = match args.get(2) {
                Some(path) => PathBuf::from(path),
                None => match std::env::current_exe() {
                    Ok(exe) => exe,
                    Err(e) => fail(&UpdateError::FileSystem(e.to_string())),
                },
            };
            match auto_update::activate_staged(&exe) {
                Ok(activated) => print_json(&serde_json::json!({ "activated": activated })),
                Err(e) => fail(&e),
            }
        }
        "mode" | "check" | "apply" => {
            if let Err(e) = auto_update::ensure_config_exists() {
                log::warn!("Could not write default config: {}", e);
            }

            let listener: ProgressListener = Arc::new(|progress: UpdateProgress| {
                log::info!(
                    "{:?} {:.0}% {}",
                    progress.status,
                    progress.progress,
                    progress.message
                );
            });
            let coordinator = match UpdateCoordinator::with_defaults() {
                Ok(coordinator) => coordinator.with_progress_listener(listener),
                Err(e) => fail(&e),
            };

            if command == "mode" {
                let config = coordinator.get_config();
                print_json(&serde_json::json!({
                    "repository": format!("{}/{}", config.owner, config.repo),
                    "mode": coordinator.update_mode(),
                    "installPath": coordinator.install_path(),
                }));
                return;
            }

            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::info!("Ctrl-C received, cancelling");
                    trigger.cancel();
                }
            });

            let info = match coordinator.check(&cancel).await {
                Ok(info) => info,
                Err(e) => fail(&e),
            };

            if command == "check" {
                print_json(&info);
                return;
            }

            if !info.available {
                log::info!("Already up to date ({})", info.current_version);
                print_json(&info);
                return;
            }

            match coordinator.apply(&cancel).await {
                Ok(progress) => print_json(&progress),
                Err(e) => fail(&e),
            }
        }
        _ => usage(),
    }
}
