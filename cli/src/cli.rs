use clap::Parser;
use libsmashwall::{init_download, DownloadRequest, Outcome, SwError, Update};
use owo_colors::{OwoColorize, Stream::Stdout};
use std::process::ExitCode;
use tokio::sync::mpsc::channel;

const MAX_BUFFER_SIZE: usize = 100;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Smashing Magazine wallpaper downloader",
    long_about = "Downloads a month's desktop wallpaper calendars from Smashing Magazine in the given resolution."
)]
pub struct Cli {
    #[arg(short, long, help = "Resolution, example: 1920x1080")]
    resolution: String,
    #[arg(short, long, help = "Month, number or text format, example: 12 or December")]
    month: String,
    #[arg(
        short,
        long,
        value_parser = clap::value_parser!(u16).range(2011..=2020),
        help = "Year between 2011 and 2020"
    )]
    year: u16,
}

pub async fn download(cli: Cli) -> ExitCode {
    let base_dir = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            print_error(&format!("Unable to resolve working directory. {e}"));
            return ExitCode::FAILURE;
        }
    };
    let request = DownloadRequest::new(&cli.resolution, &cli.month, cli.year, base_dir);

    let (tx, mut rx) = channel::<Update>(MAX_BUFFER_SIZE);
    let handle = tokio::spawn(init_download(request, tx));
    while let Some(update) = rx.recv().await {
        match update {
            Update::MessageUpdate(msg) if msg.is_error => {
                print_error(&format!("{} | {}", msg.content, msg.resource_name));
            }
            Update::MessageUpdate(msg) => println!("{}", msg.content),
            Update::ProgressUpdate(progress) => {
                if progress.bytes_written >= progress.file_size {
                    println!(
                        "[Downloaded] {} {} bytes",
                        progress.resource_name, progress.file_size
                    )
                }
            }
        };
    }

    let result = match handle.await {
        Ok(result) => result,
        Err(e) => Err(SwError::UnknownError(e.to_string())),
    };
    match result {
        Ok(Outcome::NoResults { .. }) => {
            println!("Unable to download images with given parameters");
            ExitCode::SUCCESS
        }
        Ok(Outcome::Completed(summary)) if summary.downloaded == 0 => {
            print_error("Undefined issues occurred while attempting to download images");
            ExitCode::FAILURE
        }
        Ok(Outcome::Completed(summary)) => {
            println!(
                "{} {}",
                format!("\nDownloaded {} images", summary.downloaded)
                    .if_supports_color(Stdout, |t| t.green()),
                summary.directory.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

fn print_error(msg: &str) {
    println!("{}", msg.if_supports_color(Stdout, |t| t.red()));
}
