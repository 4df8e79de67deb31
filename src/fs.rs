//! File translation engine.
//!
//! [`CrudFs`] turns byte-range file calls into whole-object store requests.
//! Each call runs under one session lock, so a `CrudFs` can be shared
//! between tasks while the store still sees one conversation at a time.
//!
//! Write policy:
//! - first write to a file CREATEs its object (zero-filled up to the cursor)
//! - a write that stays inside the object fetches it, patches the slice and
//!   UPDATEs the same object
//! - a write past the end fetches it, CREATEs a larger copy, then DELETEs the
//!   old object
//!
//! # Example
//!
//! ```ignore
//! use crudfs_client::CrudFs;
//!
//! #[tokio::main]
//! async fn main() -> crudfs_client::Result<()> {
//!     let fs = CrudFs::builder().server_addr("127.0.0.1:19876").build();
//!
//!     fs.format().await?;
//!     fs.mount().await?;
//!
//!     let fh = fs.open("a.txt").await?;
//!     fs.write(fh, b"hello").await?;
//!     fs.seek(fh, 0).await?;
//!
//!     let mut buf = [0u8; 5];
//!     assert_eq!(fs.read(fh, &mut buf).await?, 5);
//!
//!     fs.close(fh).await?;
//!     fs.unmount().await
//! }
//! ```

use std::time::Duration;

use bytes::Bytes;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::codec::{TableCodec, TABLE_SIZE};
use crate::config::ClientConfig;
use crate::error::{CrudError, Result};
use crate::protocol::{flags, Frame, MAX_OBJECT_SIZE, UNALLOCATED_OID};
use crate::table::{FileHandle, FileStat, FileTable};
use crate::transport::{alloc_zeroed, Transport};

/// Lifecycle of the connection behind a [`CrudFs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing sent yet; the first operation connects.
    Uninitialized,
    /// Connected and past the INIT handshake.
    Active,
    /// Unmounted or dropped after a transport failure.
    Closed,
}

/// Builder for configuring and creating a [`CrudFs`].
pub struct CrudFsBuilder {
    config: ClientConfig,
}

impl CrudFsBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    /// Start from a loaded configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the object store address (`host:port`).
    ///
    /// Default: `127.0.0.1:19876`
    pub fn server_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.server_addr = addr.into();
        self
    }

    /// Set the OID the file table is read from before any format.
    ///
    /// Default: 0
    pub fn table_oid(mut self, oid: u32) -> Self {
        self.config.table_oid = oid;
        self
    }

    /// Give up on an exchange after `timeout`.
    ///
    /// Default: wait forever. A timed out exchange closes the session.
    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.config.io_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn build(self) -> CrudFs {
        CrudFs::new(self.config)
    }
}

impl Default for CrudFsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// POSIX-style files stored as whole objects in a remote CRUD store.
pub struct CrudFs {
    config: ClientConfig,
    session: Mutex<Session>,
}

impl CrudFs {
    /// Create a new builder.
    pub fn builder() -> CrudFsBuilder {
        CrudFsBuilder::new()
    }

    pub fn new(config: ClientConfig) -> Self {
        let session = Session::new(&config);
        Self {
            config,
            session: Mutex::new(session),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn state(&self) -> SessionState {
        self.session.lock().await.state
    }

    /// OID the file table is read from and written to.
    pub async fn table_oid(&self) -> u32 {
        self.session.lock().await.table_oid
    }

    /// Erase the store and write an empty file table.
    pub async fn format(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        session
            .format()
            .await
            .map_err(|e| CrudError::Format(Box::new(e)))
    }

    /// Load the file table from the store.
    pub async fn mount(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        session
            .mount()
            .await
            .map_err(|e| CrudError::Mount(Box::new(e)))
    }

    /// Write the file table back and end the session.
    pub async fn unmount(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        session
            .unmount()
            .await
            .map_err(|e| CrudError::Unmount(Box::new(e)))
    }

    /// Open `path`, creating it if needed. The cursor starts at 0.
    pub async fn open(&self, path: &str) -> Result<FileHandle> {
        let mut session = self.session.lock().await;
        session.ensure_active().await?;
        let fh = session.table.open(path)?;
        tracing::debug!("Opened {:?} as handle {}", path, fh);
        Ok(fh)
    }

    pub async fn close(&self, fh: FileHandle) -> Result<()> {
        let mut session = self.session.lock().await;
        session.ensure_active().await?;
        session.table.get_open_mut(fh)?.open = false;
        tracing::debug!("Closed handle {}", fh);
        Ok(())
    }

    /// Read up to `buf.len()` bytes at the cursor and advance it.
    ///
    /// Returns 0 at or past the end of the file.
    pub async fn read(&self, fh: FileHandle, buf: &mut [u8]) -> Result<usize> {
        let mut session = self.session.lock().await;
        session.ensure_active().await?;
        session.read(fh, buf).await
    }

    /// Write all of `data` at the cursor and advance it.
    pub async fn write(&self, fh: FileHandle, data: &[u8]) -> Result<usize> {
        let mut session = self.session.lock().await;
        session.ensure_active().await?;
        session.write(fh, data).await
    }

    /// Move the cursor. Positions past the end are allowed.
    pub async fn seek(&self, fh: FileHandle, offset: u32) -> Result<()> {
        let mut session = self.session.lock().await;
        session.ensure_active().await?;
        session.table.get_open_mut(fh)?.position = offset;
        Ok(())
    }

    /// Snapshot of the table entry behind `fh`.
    pub async fn stat(&self, fh: FileHandle) -> Result<FileStat> {
        let session = self.session.lock().await;
        Ok(session.table.get(fh)?.stat())
    }
}

/// Connection, table and table location; guarded by the `CrudFs` lock.
struct Session {
    state: SessionState,
    transport: Option<Transport<TcpStream>>,
    table: FileTable,
    table_oid: u32,
    server_addr: String,
    io_timeout: Option<Duration>,
}

impl Session {
    fn new(config: &ClientConfig) -> Self {
        Self {
            state: SessionState::Uninitialized,
            transport: None,
            table: FileTable::new(),
            table_oid: config.table_oid,
            server_addr: config.server_addr.clone(),
            io_timeout: config.io_timeout(),
        }
    }

    /// Connect and run the INIT handshake.
    async fn start(&mut self) -> Result<()> {
        let previous = self.state;
        self.transport = Some(Transport::connect(&self.server_addr).await?);

        if let Err(e) = self.request(Frame::init()).await {
            // A failed handshake leaves the session where it was.
            self.transport = None;
            self.state = previous;
            return Err(e);
        }

        self.state = SessionState::Active;
        tracing::info!("Session started with {}", self.server_addr);
        Ok(())
    }

    /// Per-file operations connect on first use but never after a close.
    async fn ensure_active(&mut self) -> Result<()> {
        match self.state {
            SessionState::Active => Ok(()),
            SessionState::Uninitialized => self.start().await,
            SessionState::Closed => Err(CrudError::NotMounted),
        }
    }

    /// Format and mount may reopen a closed session.
    async fn ensure_connected(&mut self) -> Result<()> {
        match self.state {
            SessionState::Active => Ok(()),
            SessionState::Uninitialized | SessionState::Closed => self.start().await,
        }
    }

    /// One exchange, bounded by the optional deadline.
    ///
    /// Any failure leaves the stream in an unknown position, so the
    /// connection is dropped and the session closed.
    async fn call(&mut self, request: Frame) -> Result<Frame> {
        let transport = self.transport.as_mut().ok_or(CrudError::NotMounted)?;

        let result = match self.io_timeout {
            Some(limit) => tokio::time::timeout(limit, transport.exchange(&request))
                .await
                .unwrap_or_else(|_| Err(CrudError::Timeout(limit))),
            None => transport.exchange(&request).await,
        };

        if let Err(e) = &result {
            tracing::warn!("{} exchange failed, closing session: {}", request.opcode(), e);
            self.transport = None;
            self.state = SessionState::Closed;
        }
        result
    }

    /// Exchange and require a success result.
    async fn request(&mut self, request: Frame) -> Result<Frame> {
        let opcode = request.opcode();
        let oid = request.oid();

        let response = self.call(request).await?;
        if !response.is_success() {
            tracing::debug!("Store rejected {} for object {}", opcode, oid);
            return Err(CrudError::Rejected { opcode, oid });
        }
        Ok(response)
    }

    async fn create_object(&mut self, contents: Bytes) -> Result<u32> {
        let response = self.request(Frame::create(contents, flags::NONE)).await?;
        match response.oid() {
            UNALLOCATED_OID => Err(CrudError::Protocol(
                "Store returned reserved object id 0 for a new object".to_string(),
            )),
            oid => Ok(oid),
        }
    }

    async fn fetch_object(&mut self, oid: u32, length: u32) -> Result<Bytes> {
        let response = self.request(Frame::read(oid, length, flags::NONE)).await?;
        if response.payload.len() != length as usize {
            return Err(CrudError::Protocol(format!(
                "Object {} is {} bytes, table says {}",
                oid,
                response.payload.len(),
                length
            )));
        }
        Ok(response.payload)
    }

    async fn update_object(&mut self, oid: u32, contents: Bytes) -> Result<()> {
        self.request(Frame::update(oid, contents, flags::NONE))
            .await
            .map(|_| ())
    }

    async fn delete_object(&mut self, oid: u32) -> Result<()> {
        self.request(Frame::delete(oid)).await.map(|_| ())
    }

    async fn format(&mut self) -> Result<()> {
        self.ensure_connected().await?;
        self.request(Frame::format()).await?;

        self.table.reset();
        let image = TableCodec::encode(&self.table);
        let response = self
            .request(Frame::create(image, flags::PRIORITY_OBJECT))
            .await?;
        self.table_oid = response.oid();

        tracing::info!("Format complete, file table at object {}", self.table_oid);
        Ok(())
    }

    async fn mount(&mut self) -> Result<()> {
        self.ensure_connected().await?;

        let oid = self.table_oid;
        let response = self
            .request(Frame::read(oid, TABLE_SIZE as u32, flags::PRIORITY_OBJECT))
            .await?;
        if response.payload.len() != TABLE_SIZE {
            return Err(CrudError::Protocol(format!(
                "File table object is {} bytes, expected {}",
                response.payload.len(),
                TABLE_SIZE
            )));
        }
        self.table = TableCodec::decode(&response.payload)?;

        tracing::info!(
            "Mount complete, {} files in table at object {}",
            self.table.used(),
            oid
        );
        Ok(())
    }

    async fn unmount(&mut self) -> Result<()> {
        if self.state != SessionState::Active {
            return Err(CrudError::NotMounted);
        }

        let oid = self.table_oid;
        let image = TableCodec::encode(&self.table);
        self.request(Frame::update(oid, image, flags::PRIORITY_OBJECT))
            .await?;

        let closed = self.request(Frame::close()).await;
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                tracing::debug!("Ignoring error while closing transport: {}", e);
            }
        }
        self.state = SessionState::Closed;
        closed?;

        tracing::info!("Unmount complete");
        Ok(())
    }

    async fn read(&mut self, fh: FileHandle, buf: &mut [u8]) -> Result<usize> {
        let (oid, position, length) = {
            let entry = self.table.get_open(fh)?;
            let oid = entry.object_id.ok_or(CrudError::NoData(fh))?;
            (oid, entry.position, entry.length)
        };

        let contents = self.fetch_object(oid, length).await?;

        let start = (position as usize).min(contents.len());
        let count = buf.len().min(contents.len() - start);
        buf[..count].copy_from_slice(&contents[start..start + count]);

        self.table.get_open_mut(fh)?.position = position + count as u32;
        Ok(count)
    }

    async fn write(&mut self, fh: FileHandle, data: &[u8]) -> Result<usize> {
        let (object_id, position, length) = {
            let entry = self.table.get_open(fh)?;
            (entry.object_id, entry.position, entry.length)
        };

        if data.is_empty() {
            return Ok(0);
        }

        let start = position as usize;
        let end = start
            .checked_add(data.len())
            .filter(|&end| end <= MAX_OBJECT_SIZE)
            .ok_or_else(|| {
                CrudError::Allocation(format!(
                    "Write of {} bytes at {} exceeds the {} byte object limit",
                    data.len(),
                    position,
                    MAX_OBJECT_SIZE
                ))
            })?;

        let new_oid = match object_id {
            None => {
                let mut contents = alloc_zeroed(end)?;
                contents[start..].copy_from_slice(data);
                let oid = self.create_object(Bytes::from(contents)).await?;
                tracing::debug!("Handle {} created object {} ({} bytes)", fh, oid, end);
                oid
            }
            Some(oid) if end <= length as usize => {
                let mut contents = self.fetch_object(oid, length).await?.to_vec();
                contents[start..end].copy_from_slice(data);
                self.update_object(oid, Bytes::from(contents)).await?;
                tracing::debug!("Handle {} updated object {} in place", fh, oid);
                oid
            }
            Some(old_oid) => self.grow(fh, old_oid, length, start, data).await?,
        };

        let entry = self.table.get_open_mut(fh)?;
        entry.object_id = Some(new_oid);
        entry.length = entry.length.max(end as u32);
        entry.position = end as u32;
        Ok(data.len())
    }

    /// Replace `old_oid` with a larger object holding `data` at `start`.
    ///
    /// CREATE comes before DELETE so the new bytes are stored before the old
    /// copy goes away. If the DELETE is refused the new object is removed
    /// again and the entry keeps pointing at the old one.
    async fn grow(
        &mut self,
        fh: FileHandle,
        old_oid: u32,
        length: u32,
        start: usize,
        data: &[u8],
    ) -> Result<u32> {
        let end = start + data.len();
        let current = self.fetch_object(old_oid, length).await?;

        let mut contents = alloc_zeroed(end)?;
        contents[..current.len()].copy_from_slice(&current);
        contents[start..end].copy_from_slice(data);

        let new_oid = self.create_object(Bytes::from(contents)).await?;

        if let Err(e) = self.delete_object(old_oid).await {
            tracing::warn!(
                "Handle {}: cannot delete object {} after growth, rolling back: {}",
                fh,
                old_oid,
                e
            );
            if let Err(undo) = self.delete_object(new_oid).await {
                tracing::warn!("Object {} is orphaned: {}", new_oid, undo);
            }
            return Err(e);
        }

        tracing::debug!(
            "Handle {} grew object {} -> {} ({} -> {} bytes)",
            fh,
            old_oid,
            new_oid,
            length,
            end
        );
        Ok(new_oid)
    }
}
