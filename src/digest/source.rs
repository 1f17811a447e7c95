use std::{
    fs::File,
    io::{ErrorKind, Read},
    path::Path,
};

use log::debug;

use crate::error::DigestError;

/// An open, readable stream together with its total length.
pub struct OpenedStream<R> {
    pub stream: R,
    pub length: u64,
}

/// Opens a path for reading, translating failures into [`DigestError`] open variants.
pub trait StreamOpener {
    type Stream: Read + Send;

    fn open_read(&self, path: &Path) -> Result<OpenedStream<Self::Stream>, DigestError>;
}

/// Opens regular files on the local file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileOpener;

impl StreamOpener for FileOpener {
    type Stream = File;

    fn open_read(&self, path: &Path) -> Result<OpenedStream<File>, DigestError> {
        let file = File::open(path).map_err(|e| open_error(path, e))?;
        let metadata = file.metadata().map_err(|e| open_error(path, e))?;
        if !metadata.is_file() {
            return Err(DigestError::NotAFile(path.to_path_buf()));
        }

        debug!("opened {:?} ({} bytes)", path, metadata.len());
        Ok(OpenedStream {
            stream: file,
            length: metadata.len(),
        })
    }
}

fn open_error(path: &Path, error: std::io::Error) -> DigestError {
    match error.kind() {
        ErrorKind::NotFound => DigestError::NotFound(path.to_path_buf()),
        ErrorKind::PermissionDenied => DigestError::PermissionDenied(path.to_path_buf()),
        _ => DigestError::OpenFailed {
            path: path.to_path_buf(),
            source: error,
        },
    }
}
