//! # Busline Filestore
//!
//! Durable [`LedgerStore`] backed by a single JSON document.
//!
//! The whole persisted state is one document with two tables, `buses`
//! (embedded per-date remaining-seat map) and `bookings`. A commit applies
//! the changeset to a copy of the in-memory tables, serializes the copy,
//! writes it to a sibling `.tmp` file, syncs, and atomically renames it over
//! the live document. A crash at any point leaves either the old or the new
//! document on disk, never a torn mix, so capacity and booking records can
//! never disagree after a reload.
//!
//! Rewriting the full document per commit trades throughput for simplicity;
//! at the fleet sizes this store is built for, the document is a few
//! kilobytes and the rename is the dominant cost.

use busline_core::ledger::{Changeset, LedgerError, LedgerStore};
use busline_core::types::{Booking, BookingId, Bus, BusId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Wire shape of the persisted document: two tables, nothing else.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Document {
    buses: Vec<Bus>,
    bookings: Vec<Booking>,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    buses: HashMap<BusId, Bus>,
    bookings: HashMap<BookingId, Booking>,
}

impl Tables {
    fn from_document(document: Document) -> Self {
        Self {
            buses: document.buses.into_iter().map(|b| (b.id, b)).collect(),
            bookings: document.bookings.into_iter().map(|b| (b.id, b)).collect(),
        }
    }

    fn to_document(&self) -> Document {
        let mut buses: Vec<Bus> = self.buses.values().cloned().collect();
        buses.sort_by_key(|b| b.id);
        let mut bookings: Vec<Booking> = self.bookings.values().cloned().collect();
        bookings.sort_by_key(|b| (b.created_at, *b.id.as_uuid()));
        Document { buses, bookings }
    }

    fn apply(&mut self, changeset: &Changeset) -> Result<(), LedgerError> {
        for update in &changeset.seat_updates {
            let bus = self.buses.get_mut(&update.bus_id).ok_or_else(|| {
                LedgerError::Corrupt(format!(
                    "changeset references unknown bus {}",
                    update.bus_id
                ))
            })?;
            bus.schedule.insert(update.date, update.remaining);
        }
        self.bookings
            .insert(changeset.booking.id, changeset.booking.clone());
        Ok(())
    }
}

/// Durable ledger store over one atomically replaced JSON document.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    tables: Mutex<Tables>,
}

impl FileLedger {
    /// Open an existing ledger document, or start empty if none exists yet.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Io`]: the document exists but could not be read
    /// - [`LedgerError::Corrupt`]: the document cannot be parsed
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let tables = match read_document(&path).await? {
            Some(document) => {
                let tables = Tables::from_document(document);
                tracing::info!(
                    path = %path.display(),
                    buses = tables.buses.len(),
                    bookings = tables.bookings.len(),
                    "ledger document loaded"
                );
                tables
            }
            None => Tables::default(),
        };
        Ok(Self {
            path,
            tables: Mutex::new(tables),
        })
    }

    /// Open an existing ledger document, seeding an absent one with `buses`.
    ///
    /// The seed document is persisted immediately so a crash right after
    /// first start still reloads the same fleet.
    ///
    /// # Errors
    ///
    /// Same as [`FileLedger::open`], plus [`LedgerError::Io`] /
    /// [`LedgerError::Serialization`] if the seed document cannot be written.
    pub async fn open_or_seed(
        path: impl Into<PathBuf>,
        buses: Vec<Bus>,
    ) -> Result<Self, LedgerError> {
        let path = path.into();
        if read_document(&path).await?.is_none() {
            let tables = Tables {
                buses: buses.into_iter().map(|b| (b.id, b)).collect(),
                bookings: HashMap::new(),
            };
            write_document(&path, &tables.to_document()).await?;
            tracing::info!(
                path = %path.display(),
                buses = tables.buses.len(),
                "ledger document seeded"
            );
            return Ok(Self {
                path,
                tables: Mutex::new(tables),
            });
        }
        Self::open(path).await
    }

    /// Path of the live document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LedgerStore for FileLedger {
    fn load_all(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<(Vec<Bus>, Vec<Booking>), LedgerError>> + Send + '_>>
    {
        Box::pin(async move {
            let tables = self.tables.lock().await;
            let document = tables.to_document();
            Ok((document.buses, document.bookings))
        })
    }

    fn commit(
        &self,
        changeset: Changeset,
    ) -> Pin<Box<dyn Future<Output = Result<(), LedgerError>> + Send + '_>> {
        Box::pin(async move {
            let mut tables = self.tables.lock().await;

            // Apply to a copy first: if the write fails, the in-memory
            // tables must still match the document on disk.
            let mut next = tables.clone();
            next.apply(&changeset)?;
            write_document(&self.path, &next.to_document()).await?;

            *tables = next;
            tracing::debug!(
                booking = %changeset.booking.id,
                status = %changeset.booking.status,
                cells = changeset.seat_updates.len(),
                "changeset committed"
            );
            Ok(())
        })
    }
}

async fn read_document(path: &Path) -> Result<Option<Document>, LedgerError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let document = serde_json::from_slice(&bytes).map_err(|e| {
                LedgerError::Corrupt(format!("{}: {e}", path.display()))
            })?;
            Ok(Some(document))
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(LedgerError::Io(format!("{}: {err}", path.display()))),
    }
}

async fn write_document(path: &Path, document: &Document) -> Result<(), LedgerError> {
    let bytes = serde_json::to_vec_pretty(document)
        .map_err(|e| LedgerError::Serialization(e.to_string()))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LedgerError::Io(format!("{}: {e}", parent.display())))?;
        }
    }

    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp)
        .await
        .map_err(|e| LedgerError::Io(format!("{}: {e}", tmp.display())))?;
    file.write_all(&bytes)
        .await
        .map_err(|e| LedgerError::Io(format!("{}: {e}", tmp.display())))?;
    file.sync_all()
        .await
        .map_err(|e| LedgerError::Io(format!("{}: {e}", tmp.display())))?;
    drop(file);

    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| LedgerError::Io(format!("{}: {e}", path.display())))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn document_serialization_shape() {
        let document = Document::default();
        let json = serde_json::to_value(&document).unwrap();
        assert!(json.get("buses").is_some());
        assert!(json.get("bookings").is_some());
    }
}
