//! Response body capture: destination selection and filter chains.
//!
//! Each request gets a [`BodyCapture`] when it is added to the scheduler. The
//! transport writes response chunks into it, and the finished
//! [`CapturedBody`] travels with the completed request into the result.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;

/// Where response bodies are buffered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BodyDestination {
    /// Keep the body in memory.
    #[default]
    Memory,
    /// Spool the body to an anonymous temporary file, read back on demand.
    TempFile,
}

/// Transformation applied to every chunk of a response body, in order.
#[derive(Clone)]
pub enum BodyFilter {
    /// ASCII lower-casing.
    Lowercase,
    /// ASCII upper-casing.
    Uppercase,
    /// ROT13 over ASCII letters.
    Rot13,
    /// Caller-supplied chunk transformation. Must not depend on chunk boundaries.
    Custom(Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>),
}

impl BodyFilter {
    /// Applies the filter to one chunk.
    #[must_use]
    pub fn apply(&self, chunk: &[u8]) -> Vec<u8> {
        match self {
            Self::Lowercase => chunk.to_ascii_lowercase(),
            Self::Uppercase => chunk.to_ascii_uppercase(),
            Self::Rot13 => chunk.iter().map(|&b| rot13(b)).collect(),
            Self::Custom(filter) => filter(chunk),
        }
    }
}

impl fmt::Debug for BodyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lowercase => f.write_str("Lowercase"),
            Self::Uppercase => f.write_str("Uppercase"),
            Self::Rot13 => f.write_str("Rot13"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

fn rot13(byte: u8) -> u8 {
    match byte {
        b'a'..=b'z' => (byte - b'a' + 13) % 26 + b'a',
        b'A'..=b'Z' => (byte - b'A' + 13) % 26 + b'A',
        _ => byte,
    }
}

enum CaptureTarget {
    Memory(Vec<u8>),
    File(tokio::fs::File),
}

/// Write side of a response body buffer.
pub struct BodyCapture {
    target: CaptureTarget,
    filters: Arc<[BodyFilter]>,
    written: u64,
}

impl fmt::Debug for BodyCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = match self.target {
            CaptureTarget::Memory(_) => "memory",
            CaptureTarget::File(_) => "temp_file",
        };
        f.debug_struct("BodyCapture")
            .field("target", &target)
            .field("filters", &self.filters.len())
            .field("written", &self.written)
            .finish()
    }
}

impl BodyCapture {
    /// Opens a capture for `destination`.
    ///
    /// # Errors
    ///
    /// Returns an IO error if a temporary file cannot be created.
    pub fn open(destination: BodyDestination, filters: Arc<[BodyFilter]>) -> io::Result<Self> {
        let target = match destination {
            BodyDestination::Memory => CaptureTarget::Memory(Vec::new()),
            BodyDestination::TempFile => {
                CaptureTarget::File(tokio::fs::File::from_std(tempfile::tempfile()?))
            }
        };
        Ok(Self {
            target,
            filters,
            written: 0,
        })
    }

    /// In-memory capture without filters.
    #[must_use]
    pub fn memory() -> Self {
        Self {
            target: CaptureTarget::Memory(Vec::new()),
            filters: Arc::from(Vec::new()),
            written: 0,
        }
    }

    /// Number of (filtered) bytes written so far.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Runs `chunk` through the filter chain and appends it.
    ///
    /// # Errors
    ///
    /// Returns an IO error if writing to the temporary file fails.
    pub async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        let mut filtered: Option<Vec<u8>> = None;
        for filter in self.filters.iter() {
            let input = filtered.as_deref().unwrap_or(chunk);
            filtered = Some(filter.apply(input));
        }
        let bytes = filtered.as_deref().unwrap_or(chunk);

        match &mut self.target {
            CaptureTarget::Memory(buffer) => buffer.extend_from_slice(bytes),
            CaptureTarget::File(file) => file.write_all(bytes).await?,
        }
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Flushes and closes the write side.
    ///
    /// # Errors
    ///
    /// Returns an IO error if flushing the temporary file fails.
    pub async fn finish(self) -> io::Result<CapturedBody> {
        match self.target {
            CaptureTarget::Memory(buffer) => Ok(CapturedBody::Memory(buffer)),
            CaptureTarget::File(mut file) => {
                file.flush().await?;
                Ok(CapturedBody::File(file.into_std().await))
            }
        }
    }
}

/// Read side of a finished response body.
#[derive(Debug)]
pub enum CapturedBody {
    /// Body held in memory.
    Memory(Vec<u8>),
    /// Body spooled to an anonymous temporary file.
    File(std::fs::File),
}

impl Default for CapturedBody {
    fn default() -> Self {
        Self::Memory(Vec::new())
    }
}

impl CapturedBody {
    /// Reads the whole body from the start.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the temporary file cannot be read.
    pub fn read_all(&self) -> io::Result<Vec<u8>> {
        match self {
            Self::Memory(buffer) => Ok(buffer.clone()),
            Self::File(file) => {
                let mut handle = file;
                handle.seek(SeekFrom::Start(0))?;
                let mut buffer = Vec::new();
                handle.read_to_end(&mut buffer)?;
                Ok(buffer)
            }
        }
    }

    /// Streams the body from the start.
    ///
    /// A file-backed body is read from disk as the reader is consumed.
    /// Readers share the file position, so use one at a time.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the temporary file cannot be rewound.
    pub fn reader(&self) -> io::Result<Box<dyn Read + Send + '_>> {
        match self {
            Self::Memory(buffer) => Ok(Box::new(buffer.as_slice())),
            Self::File(file) => {
                let mut handle = file;
                handle.seek(SeekFrom::Start(0))?;
                Ok(Box::new(io::BufReader::new(handle)))
            }
        }
    }

    /// Returns `true` when the body is spooled to a file.
    #[must_use]
    pub fn is_file_backed(&self) -> bool {
        matches!(self, Self::File(_))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn filters(list: Vec<BodyFilter>) -> Arc<[BodyFilter]> {
        Arc::from(list)
    }

    #[tokio::test]
    async fn test_memory_capture_round_trip() {
        let mut capture = BodyCapture::open(BodyDestination::Memory, filters(vec![])).unwrap();
        capture.write(b"hello ").await.unwrap();
        capture.write(b"world").await.unwrap();
        assert_eq!(capture.written(), 11);

        let body = capture.finish().await.unwrap();
        assert!(!body.is_file_backed());
        assert_eq!(body.read_all().unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_temp_file_capture_reads_back_repeatedly() {
        let mut capture = BodyCapture::open(BodyDestination::TempFile, filters(vec![])).unwrap();
        capture.write(b"spooled").await.unwrap();

        let body = capture.finish().await.unwrap();
        assert!(body.is_file_backed());
        assert_eq!(body.read_all().unwrap(), b"spooled");
        assert_eq!(body.read_all().unwrap(), b"spooled");
    }

    #[tokio::test]
    async fn test_temp_file_body_streams_in_pieces() {
        let chain = filters(vec![BodyFilter::Uppercase]);
        let mut capture = BodyCapture::open(BodyDestination::TempFile, chain).unwrap();
        for _ in 0..64 {
            capture.write(b"chunk-").await.unwrap();
        }
        let body = capture.finish().await.unwrap();

        let mut reader = body.reader().unwrap();
        let mut head = [0u8; 6];
        reader.read_exact(&mut head).unwrap();
        assert_eq!(&head, b"CHUNK-");
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest.len(), 63 * 6);
        drop(reader);

        // A fresh reader starts over.
        let mut again = String::new();
        body.reader().unwrap().read_to_string(&mut again).unwrap();
        assert_eq!(again, "CHUNK-".repeat(64));
    }

    #[test]
    fn test_memory_body_reader() {
        let body = CapturedBody::Memory(b"in memory".to_vec());
        let mut text = String::new();
        body.reader().unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "in memory");
    }

    #[tokio::test]
    async fn test_filters_apply_in_order() {
        let chain = filters(vec![BodyFilter::Uppercase, BodyFilter::Rot13]);
        let mut capture = BodyCapture::open(BodyDestination::Memory, chain).unwrap();
        capture.write(b"abc-xyz").await.unwrap();

        let body = capture.finish().await.unwrap();
        assert_eq!(body.read_all().unwrap(), b"NOP-KLM");
    }

    #[tokio::test]
    async fn test_custom_filter() {
        let strip_digits = BodyFilter::Custom(Arc::new(|chunk: &[u8]| {
            chunk.iter().copied().filter(|b| !b.is_ascii_digit()).collect()
        }));
        let mut capture = BodyCapture::open(BodyDestination::Memory, filters(vec![strip_digits]))
            .unwrap();
        capture.write(b"a1b2c3").await.unwrap();

        assert_eq!(capture.written(), 3);
        let body = capture.finish().await.unwrap();
        assert_eq!(body.read_all().unwrap(), b"abc");
    }

    #[test]
    fn test_unfiltered_memory_capture() {
        let mut capture = BodyCapture::memory();
        tokio_test::block_on(capture.write(b"Raw")).unwrap();

        let body = tokio_test::block_on(capture.finish()).unwrap();
        assert_eq!(body.read_all().unwrap(), b"Raw");
    }

    #[test]
    fn test_rot13_is_self_inverse() {
        let once = BodyFilter::Rot13.apply(b"Hello, World!");
        assert_eq!(once, b"Uryyb, Jbeyq!");
        assert_eq!(BodyFilter::Rot13.apply(&once), b"Hello, World!");
    }
}
