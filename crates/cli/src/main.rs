mod client;
mod event;
mod tui;
mod widgets;

use std::path::PathBuf;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use client::CtlClient;

const DEFAULT_SOCKET: &str = "/run/chargecap.sock";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Panic hook: restore the terminal even on a panic in raw mode (watch).
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = crossterm::terminal::disable_raw_mode();
        let _ = crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen);
        default_hook(info);
    }));

    // Tracing: write to a file when RUST_LOG is set (raw mode breaks stderr).
    if std::env::var("RUST_LOG").is_ok() {
        let file = std::fs::File::create("/tmp/chargecapctl.log")?;
        tracing_subscriber::registry()
            .with(EnvFilter::from_default_env())
            .with(fmt::layer().json().with_writer(file))
            .init();
    }

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let socket = match args.first().map(String::as_str) {
        Some("--socket") => {
            args.remove(0);
            if args.is_empty() {
                usage();
            }
            PathBuf::from(args.remove(0))
        }
        _ => PathBuf::from(
            std::env::var("CHARGECAP_SOCKET").unwrap_or_else(|_| DEFAULT_SOCKET.to_owned()),
        ),
    };

    let mut client = CtlClient::connect(&socket).await?;
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match args.as_slice() {
        ["get", param] => println!("{}", client.get(param).await?),
        ["set", param, value] => {
            client.set(param, value).await?;
            println!("ok");
        }
        ["status"] => print_status(&client.status().await?),
        ["watch"] => tui::run_app(client).await?,
        _ => usage(),
    }
    Ok(())
}

fn print_status(status: &chargecap_core::limiter::LimiterStatus) {
    println!("running:     {}", status.running);
    match &status.reading {
        Some(reading) => {
            println!(
                "battery:     {}% ({})",
                reading.percent,
                reading.status.as_str()
            );
            println!("usb:         {}", if reading.usb_present { "present" } else { "absent" });
        }
        None => println!("battery:     no reading"),
    }
    println!(
        "band:        resume at {}%, cut off at {}%",
        status.lower_threshold, status.upper_threshold
    );
    println!("suppressed:  {}", status.charging_suppressed);
    println!("pending:     {}", status.cutoff_pending);
    println!("ticks:       {}", status.tick_count);
}

fn usage() -> ! {
    eprintln!(
        "usage: chargecapctl [--socket PATH] <command>\n\
         \n\
         commands:\n\
         \x20 get <param>           read a tunable (enabled, lower_threshold, upper_threshold)\n\
         \x20 set <param> <value>   write a tunable\n\
         \x20 status                one-shot limiter status\n\
         \x20 watch                 live dashboard"
    );
    std::process::exit(2);
}
