use image::codecs::png::PngEncoder;
use image::{ImageEncoder, ImageError, RgbaImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// File extensions offered in the open dialog.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "webp", "bmp", "tga", "ico", "tif", "tiff", "gif",
];

// ============================================================================
// IMAGE SOURCE
// ============================================================================

/// A decoded source image.  Immutable; a new upload replaces it wholesale.
#[derive(Clone, Debug)]
pub struct ImageSource {
    /// Fresh per decode; crop caches key on it.
    pub id: Uuid,
    pub name: String,
    pub pixels: Arc<RgbaImage>,
}

impl ImageSource {
    pub fn from_rgba(name: impl Into<String>, pixels: RgbaImage) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            pixels: Arc::new(pixels),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn aspect(&self) -> f32 {
        if self.height() == 0 { 1.0 } else { self.width() as f32 / self.height() as f32 }
    }
}

/// Error type for image decoding
#[derive(Debug)]
pub enum LoadError {
    Io(std::io::Error),
    Decode(String),
    Empty,
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Io(e) => write!(f, "I/O error: {}", e),
            LoadError::Decode(e) => write!(f, "Decode error: {}", e),
            LoadError::Empty => write!(f, "Image has zero width or height"),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        LoadError::Io(e)
    }
}

impl From<ImageError> for LoadError {
    fn from(e: ImageError) -> Self {
        match e {
            ImageError::IoError(io) => LoadError::Io(io),
            other => LoadError::Decode(other.to_string()),
        }
    }
}

/// Decode any supported format to RGBA.  GIFs yield their first frame.
pub fn load_image_sync(path: &Path) -> Result<ImageSource, LoadError> {
    let img = image::open(path)?.to_rgba8();
    if img.width() == 0 || img.height() == 0 {
        return Err(LoadError::Empty);
    }
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("image")
        .to_string();
    Ok(ImageSource::from_rgba(name, img))
}

/// Write `image` as an RGBA PNG.
pub fn save_png(image: &RgbaImage, path: &Path) -> Result<(), ImageError> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    PngEncoder::new(writer).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ColorType::Rgba8,
    )
}

// ============================================================================
// BACKGROUND LOADS: last request wins
// ============================================================================

/// Result of one background decode, tagged with the ticket it was issued under.
#[derive(Debug)]
pub struct LoadOutcome {
    pub ticket: u64,
    pub path: PathBuf,
    pub result: Result<ImageSource, LoadError>,
}

/// Runs decodes on the rayon pool and hands back only the newest request.
///
/// Every request takes the next ticket.  An outcome whose ticket is not the
/// latest issued one is stale and gets dropped, however late or early it
/// arrives.
pub struct LoadQueue {
    issued: u64,
    applied: u64,
    sender: mpsc::Sender<LoadOutcome>,
    receiver: mpsc::Receiver<LoadOutcome>,
}

impl Default for LoadQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { issued: 0, applied: 0, sender, receiver }
    }

    /// Decode `path` in the background.  Returns the request's ticket.
    pub fn request(&mut self, path: PathBuf) -> u64 {
        let job_path = path.clone();
        self.submit_with(path, move || load_image_sync(&job_path))
    }

    /// Run an arbitrary decode job under a fresh ticket.
    pub fn submit_with<F>(&mut self, path: PathBuf, job: F) -> u64
    where
        F: FnOnce() -> Result<ImageSource, LoadError> + Send + 'static,
    {
        self.issued += 1;
        let ticket = self.issued;
        let sender = self.sender.clone();
        crate::log_info!("Load #{} queued: {}", ticket, path.display());
        rayon::spawn(move || {
            let result = job();
            let _ = sender.send(LoadOutcome { ticket, path, result });
        });
        ticket
    }

    /// A request is outstanding whose result has not been handed out yet.
    pub fn is_pending(&self) -> bool {
        self.applied < self.issued
    }

    fn accept(&mut self, outcome: LoadOutcome) -> Option<LoadOutcome> {
        if outcome.ticket == self.issued && self.applied < self.issued {
            self.applied = outcome.ticket;
            Some(outcome)
        } else {
            crate::log_info!(
                "Load #{} superseded by #{}, dropping {}",
                outcome.ticket,
                self.issued,
                outcome.path.display()
            );
            None
        }
    }

    /// Non-blocking: drain finished jobs and return the newest request's outcome if it is in.
    pub fn poll(&mut self) -> Option<LoadOutcome> {
        let mut winner = None;
        while let Ok(outcome) = self.receiver.try_recv() {
            if let Some(o) = self.accept(outcome) {
                winner = Some(o);
            }
        }
        winner
    }

    /// Block until the newest request finishes or `timeout` passes.
    pub fn wait(&mut self, timeout: Duration) -> Option<LoadOutcome> {
        let deadline = Instant::now() + timeout;
        while self.is_pending() {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return None;
            }
            match self.receiver.recv_timeout(left) {
                Ok(outcome) => {
                    if let Some(o) = self.accept(outcome) {
                        return Some(o);
                    }
                }
                Err(_) => return None,
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(name: &str, w: u32) -> ImageSource {
        ImageSource::from_rgba(name, RgbaImage::from_pixel(w, 4, Rgba([1, 2, 3, 255])))
    }

    #[test]
    fn sources_get_distinct_ids() {
        let a = solid("a", 4);
        let b = solid("a", 4);
        assert_ne!(a.id, b.id);
        assert_eq!(a.aspect(), 1.0);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = load_image_sync(Path::new("/definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, LoadError::Io(_)), "{err}");
    }

    #[test]
    fn png_save_then_load() {
        let dir = std::env::temp_dir().join(format!("osmosis-io-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("out.png");
        let img = RgbaImage::from_fn(5, 3, |x, y| Rgba([x as u8 * 40, y as u8 * 80, 7, 200]));
        save_png(&img, &path).unwrap();
        let back = load_image_sync(&path).unwrap();
        assert_eq!(*back.pixels, img);
        assert_eq!(back.name, "out.png");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn slow_earlier_load_never_wins() {
        let mut q = LoadQueue::new();
        let slow = q.submit_with(PathBuf::from("slow.png"), || {
            std::thread::sleep(Duration::from_millis(150));
            Ok(solid("slow", 8))
        });
        let fast = q.submit_with(PathBuf::from("fast.png"), || Ok(solid("fast", 2)));
        assert!(fast > slow);

        let outcome = q.wait(Duration::from_secs(5)).expect("latest load");
        assert_eq!(outcome.ticket, fast);
        assert_eq!(outcome.result.unwrap().name, "fast");
        assert!(!q.is_pending());

        std::thread::sleep(Duration::from_millis(300));
        assert!(q.poll().is_none());
    }

    #[test]
    fn earlier_result_arriving_first_is_dropped() {
        let mut q = LoadQueue::new();
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        q.submit_with(PathBuf::from("first.png"), || Ok(solid("first", 2)));
        let second = q.submit_with(PathBuf::from("second.png"), move || {
            let _ = gate_rx.recv_timeout(Duration::from_secs(5));
            Ok(solid("second", 2))
        });
        std::thread::sleep(Duration::from_millis(100));
        assert!(q.poll().is_none());
        assert!(q.is_pending());
        gate_tx.send(()).unwrap();
        let outcome = q.wait(Duration::from_secs(5)).expect("second load");
        assert_eq!(outcome.ticket, second);
    }
}
