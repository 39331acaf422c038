use crate::errors::SwError;
use crate::Update::{MessageUpdate, ProgressUpdate};
use crate::{Message, Progress, Update, CHUNK_SIZE};
use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::Sender;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use url::Url;

/// Tags each in-progress file so same-named downloads never share one.
static PART_FILE_ID: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
pub struct DownloadItem {
    pub link: String,
    pub destination_dir: PathBuf,
}

impl DownloadItem {
    /// The last path segment of the link, percent-decoded, query excluded.
    pub fn file_name(&self) -> Result<String, SwError> {
        Url::parse(&self.link)
            .ok()
            .and_then(|url| {
                url.path_segments()
                    .and_then(|mut segments| segments.next_back().map(str::to_string))
            })
            .map(|segment| match urlencoding::decode(&segment) {
                Ok(decoded) => decoded.into_owned(),
                Err(_) => segment,
            })
            .filter(|name| {
                !name.is_empty() && name != ".." && !name.contains(['/', '\\'])
            })
            .ok_or_else(|| SwError::InvalidUrl(self.link.clone()))
    }
}

/// Downloads every link into `dest_dir`, at most `max_concurrency` at a time.
/// Returns the number of files that were fully written. A failed link never
/// stops the others.
#[tracing::instrument(skip(client, update_tx))]
pub async fn fetch_all(
    client: &Arc<Client>,
    dest_dir: &Path,
    links: &[String],
    max_concurrency: usize,
    update_tx: Sender<Update>,
) -> usize {
    if links.is_empty() {
        return 0;
    }

    let gate = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut dld_tasks: FuturesUnordered<JoinHandle<bool>> = links
        .iter()
        .map(|link| {
            download_image(
                gate.clone(),
                client.clone(),
                DownloadItem {
                    link: link.to_owned(),
                    destination_dir: dest_dir.to_path_buf(),
                },
                update_tx.clone(),
            )
        })
        .collect();

    let mut downloaded = 0;
    while let Some(outcome) = dld_tasks.next().await {
        match outcome {
            Ok(true) => downloaded += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::error!("Download thread panicked\nError : {}", e);
            }
        }
    }
    tracing::debug!("{} of {} images downloaded", downloaded, links.len());
    downloaded
}

fn download_image(
    gate: Arc<Semaphore>,
    client: Arc<Client>,
    dld_item: DownloadItem,
    update_tx: Sender<Update>,
) -> JoinHandle<bool> {
    tokio::spawn(async move {
        let _permit = match gate.acquire_owned().await {
            Ok(p) => p,
            Err(e) => {
                tracing::error!("Download gate closed\nError : {}", e);
                return false;
            }
        };
        let link = dld_item.link.clone();
        match download_file(&client, dld_item, &update_tx).await {
            Ok(f_path) => {
                tracing::debug!("Download completed for {}, file @ {}", link, f_path.display());
                true
            }
            Err(e) => {
                tracing::error!("Error downloading image from {}", link);
                tracing::error!("{}", e);
                notify(
                    &update_tx,
                    MessageUpdate(Message {
                        content: e.to_string(),
                        resource_name: link,
                        is_error: true,
                    }),
                );
                false
            }
        }
    })
}

/// Takes care of downloading a single file. The returned path is the path to the downloaded file
#[tracing::instrument(skip(client, update_tx))]
pub async fn download_file(
    client: &Client,
    dld_item: DownloadItem,
    update_tx: &Sender<Update>,
) -> Result<PathBuf, SwError> {
    let f_name = dld_item.file_name()?;

    let mut response = client
        .get(&dld_item.link)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| SwError::from_request_error(e, &dld_item.link))?;

    let f_size = response.content_length().unwrap_or(0);
    let f_path = dld_item.destination_dir.join(&f_name);
    // Written under a name of its own, moved onto f_path once complete
    let part_path = dld_item.destination_dir.join(format!(
        ".{f_name}.{}-{}.part",
        std::process::id(),
        PART_FILE_ID.fetch_add(1, Ordering::Relaxed)
    ));
    tracing::debug!("File name for {} is {}", dld_item.link, f_name);

    let mut dest_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&part_path)
        .await
        .map_err(|e| {
            tracing::error!("Error opening/creating file {}", part_path.display());
            file_error(&part_path, e)
        })?;

    let mut bytes_written = 0u64;
    let streamed: Result<(), SwError> = async {
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| SwError::from_request_error(e, &dld_item.link))?
        {
            for piece in chunk.chunks(CHUNK_SIZE) {
                dest_file
                    .write_all(piece)
                    .await
                    .map_err(|e| file_error(&part_path, e))?;
                bytes_written += piece.len() as u64;
            }
        }
        dest_file.flush().await.map_err(|e| file_error(&part_path, e))
    }
    .await;
    drop(dest_file);

    let moved = match streamed {
        Ok(()) => fs::rename(&part_path, &f_path)
            .await
            .map_err(|e| file_error(&f_path, e)),
        Err(e) => Err(e),
    };
    if let Err(e) = moved {
        if let Err(rm_err) = fs::remove_file(&part_path).await {
            tracing::warn!(
                "Unable to remove partial file {}\nError : {}",
                part_path.display(),
                rm_err
            );
        }
        return Err(e);
    }

    notify(
        update_tx,
        ProgressUpdate(Progress {
            bytes_written,
            file_size: if f_size == 0 { bytes_written } else { f_size },
            resource_name: f_name,
        }),
    );
    Ok(f_path)
}

fn file_error(f_path: &Path, e: std::io::Error) -> SwError {
    tracing::error!("{} | {}", e, e.kind());
    SwError::FileOperationError {
        file_name: f_path.to_string_lossy().to_string(),
        message: format!("{} | {}", e, e.kind()),
    }
}

/// Updates are best effort, a full or closed channel never holds up a download.
pub(crate) fn notify(update_tx: &Sender<Update>, update: Update) {
    if let Err(e) = update_tx.try_send(update) {
        tracing::debug!("Update dropped : {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::mpsc::channel;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    fn client(timeout: Duration) -> Arc<Client> {
        Arc::new(Client::builder().timeout(timeout).build().unwrap())
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    async fn serve_image(server: &MockServer, route: &str, body: &[u8]) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
            .mount(server)
            .await;
    }

    #[test]
    fn file_name_is_last_path_segment() {
        let item = DownloadItem {
            link: "http://files.abc.com/wallpapers/may-19/cal/may-19-cal-800x480.png?v=2".into(),
            destination_dir: PathBuf::from("."),
        };
        assert_eq!(item.file_name().unwrap(), "may-19-cal-800x480.png");

        let item = DownloadItem {
            link: "http://files.abc.com/wallpapers/".into(),
            destination_dir: PathBuf::from("."),
        };
        assert!(matches!(item.file_name(), Err(SwError::InvalidUrl(_))));
    }

    #[test]
    fn file_name_is_percent_decoded() {
        let item = DownloadItem {
            link: "http://files.abc.com/wallpapers/spring%20cal-800x480.png".into(),
            destination_dir: PathBuf::from("."),
        };
        assert_eq!(item.file_name().unwrap(), "spring cal-800x480.png");

        for link in [
            "http://files.abc.com/wallpapers/a%2Fb.png",
            "http://files.abc.com/wallpapers/a%5Cb.png",
            "http://files.abc.com/wallpapers/%2E%2E",
        ] {
            let item = DownloadItem {
                link: link.into(),
                destination_dir: PathBuf::from("."),
            };
            assert!(matches!(item.file_name(), Err(SwError::InvalidUrl(_))), "{link}");
        }
    }

    #[tokio::test]
    async fn empty_batch_downloads_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let (tx, _rx) = channel(10);
        let count = fetch_all(
            &client(Duration::from_secs(1)),
            temp_dir.path(),
            &[],
            5,
            tx,
        )
        .await;
        assert_eq!(count, 0);
        assert!(files_in(temp_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn counts_only_successful_downloads() {
        let server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();
        let big = vec![7u8; CHUNK_SIZE * 3 + 17];
        for i in 0..6 {
            serve_image(&server, &format!("/ok/{i}.png"), &big).await;
        }
        Mock::given(method("GET"))
            .and(path("/missing.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken.png"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/slow.png"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![1u8; 10])
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let mut links: Vec<String> = (0..6)
            .map(|i| format!("{}/ok/{i}.png", server.uri()))
            .collect();
        links.push(format!("{}/missing.png", server.uri()));
        links.push(format!("{}/broken.png", server.uri()));
        links.push(format!("{}/slow.png", server.uri()));
        // Nothing listens on port 1
        links.push("http://127.0.0.1:1/refused.png".to_string());

        let (tx, _rx) = channel(100);
        let count = fetch_all(
            &client(Duration::from_millis(500)),
            temp_dir.path(),
            &links,
            5,
            tx,
        )
        .await;

        assert_eq!(count, 6);
        let names = files_in(temp_dir.path());
        assert_eq!(names, vec!["0.png", "1.png", "2.png", "3.png", "4.png", "5.png"]);
        let written = std::fs::read(temp_dir.path().join("3.png")).unwrap();
        assert_eq!(written, big);
    }

    #[tokio::test]
    async fn same_file_name_keeps_one_whole_body() {
        let server = MockServer::start().await;
        let large = vec![b'A'; 200_000];
        let small = vec![b'B'; 1_000];
        serve_image(&server, "/a/wall.png", &large).await;
        serve_image(&server, "/b/wall.png", &small).await;
        let links = vec![
            format!("{}/a/wall.png", server.uri()),
            format!("{}/b/wall.png", server.uri()),
        ];

        for _ in 0..10 {
            let temp_dir = TempDir::new().unwrap();
            let (tx, _rx) = channel(10);
            let count = fetch_all(
                &client(Duration::from_secs(5)),
                temp_dir.path(),
                &links,
                5,
                tx,
            )
            .await;

            assert_eq!(count, 2);
            assert_eq!(files_in(temp_dir.path()), vec!["wall.png"]);
            let content = std::fs::read(temp_dir.path().join("wall.png")).unwrap();
            assert!(content == large || content == small, "{} bytes", content.len());
        }
    }

    /// Counts requests the server is still answering. A request stops counting
    /// halfway through its delay, before its slot can possibly be reused.
    struct InFlight {
        current: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        hold: Duration,
    }

    impl Respond for InFlight {
        fn respond(&self, _: &Request) -> ResponseTemplate {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let current = self.current.clone();
            let release_after = self.hold / 2;
            std::thread::spawn(move || {
                std::thread::sleep(release_after);
                current.fetch_sub(1, Ordering::SeqCst);
            });
            ResponseTemplate::new(200)
                .set_body_bytes(vec![3u8; 64])
                .set_delay(self.hold)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_concurrency_cap() {
        let server = MockServer::start().await;
        let peak = Arc::new(AtomicUsize::new(0));
        Mock::given(method("GET"))
            .respond_with(InFlight {
                current: Arc::new(AtomicUsize::new(0)),
                peak: peak.clone(),
                hold: Duration::from_millis(300),
            })
            .expect(20)
            .mount(&server)
            .await;
        let temp_dir = TempDir::new().unwrap();
        let links: Vec<String> = (0..20)
            .map(|i| format!("{}/cap/{i}.png", server.uri()))
            .collect();

        let (tx, _rx) = channel(100);
        let count = fetch_all(
            &client(Duration::from_secs(5)),
            temp_dir.path(),
            &links,
            5,
            tx,
        )
        .await;

        assert_eq!(count, 20);
        assert_eq!(files_in(temp_dir.path()).len(), 20);
        assert_eq!(peak.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn failed_download_only_removes_its_own_part_file() {
        let server = MockServer::start().await;
        serve_image(&server, "/wall.png", b"0123456789").await;
        let temp_dir = TempDir::new().unwrap();
        // A directory in the way makes the final move fail after streaming
        let blocker = temp_dir.path().join("wall.png");
        std::fs::create_dir(&blocker).unwrap();
        std::fs::write(blocker.join("keep.txt"), b"keep").unwrap();

        let (tx, _rx) = channel(10);
        let count = fetch_all(
            &client(Duration::from_secs(5)),
            temp_dir.path(),
            &[format!("{}/wall.png", server.uri())],
            5,
            tx,
        )
        .await;

        assert_eq!(count, 0);
        assert_eq!(files_in(temp_dir.path()), vec!["wall.png"]);
        assert_eq!(std::fs::read(blocker.join("keep.txt")).unwrap(), b"keep");
    }

    #[tokio::test]
    async fn reports_progress_and_failures() {
        let server = MockServer::start().await;
        let temp_dir = TempDir::new().unwrap();
        serve_image(&server, "/wall.png", b"0123456789").await;
        Mock::given(method("GET"))
            .and(path("/gone.png"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let links = vec![
            format!("{}/wall.png", server.uri()),
            format!("{}/gone.png", server.uri()),
        ];
        let (tx, mut rx) = channel(10);
        let count = fetch_all(
            &client(Duration::from_secs(5)),
            temp_dir.path(),
            &links,
            5,
            tx,
        )
        .await;
        assert_eq!(count, 1);

        let mut progress = Vec::new();
        let mut errors = Vec::new();
        while let Some(update) = rx.recv().await {
            match update {
                ProgressUpdate(p) => progress.push(p),
                MessageUpdate(m) => errors.push(m),
            }
        }
        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0].resource_name, "wall.png");
        assert_eq!(progress[0].bytes_written, 10);
        assert_eq!(progress[0].file_size, 10);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].is_error);
        assert!(errors[0].content.contains("410"));
    }

    #[tokio::test]
    async fn unnamed_link_fails_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let temp_dir = TempDir::new().unwrap();
        let (tx, _rx) = channel(10);
        let count = fetch_all(
            &client(Duration::from_secs(5)),
            temp_dir.path(),
            &[format!("{}/", server.uri())],
            5,
            tx,
        )
        .await;
        assert_eq!(count, 0);
    }
}
