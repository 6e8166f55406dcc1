//! # Event Journal
//!
//! **Append-only record of every committed operation**
//!
//! The events of an operation are written here before its new state is
//! installed. If the write fails the operation fails and the state is left
//! as it was. Off-system indexers replay the journal with
//! [`EventJournal::read_all`].
//!
//! ## Format
//!
//! ```text
//! [4 bytes: magic "BZJL"]
//! [4 bytes: version]
//!
//! Record format:
//! [8 bytes: sequence number]
//! [4 bytes: payload length]
//! [N bytes: payload (event count + encoded events)]
//! [4 bytes: CRC32 of above]
//! ```
//!
//! All integers are little-endian. Reading stops at the first torn or
//! corrupt record; [`EventJournal::open`] truncates such a tail so new
//! records follow the last good one.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use alloy_primitives::Address;

use crate::error::{BazaarError, BazaarResult};
use crate::events::{BazaarEvent, CollectionSource, DisbursementReason, LedgerOperation, LedgerRecord};
use crate::pulse::Pulse;

/// Magic bytes identifying a journal file.
const JOURNAL_MAGIC: &[u8; 4] = b"BZJL";

/// Current journal format version.
const JOURNAL_VERSION: u32 = 1;

/// Header size in bytes.
const HEADER_LEN: usize = 8;

/// Sequence number + length prefix.
const RECORD_PREFIX_LEN: usize = 12;

/// One committed operation read back from the journal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JournalEntry {
    /// Sequence number, starting at 1.
    pub sequence: u64,
    /// Events of the operation, in emission order.
    pub events: Vec<BazaarEvent>,
}

/// Append-only event journal.
#[derive(Debug)]
pub struct EventJournal {
    path: PathBuf,
    file: File,
    next_sequence: u64,
    committed_len: u64,
    sync_on_commit: bool,
}

impl EventJournal {
    /// Opens or creates a journal.
    ///
    /// An existing journal is scanned to recover the next sequence number.
    ///
    /// # Errors
    ///
    /// `Journal` if the file cannot be opened, has a foreign header, or
    /// cannot be repaired.
    pub fn open(path: impl AsRef<Path>, sync_on_commit: bool) -> BazaarResult<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| BazaarError::Journal(format!("Failed to open {}: {e}", path.display())))?;

        let existing = std::fs::read(&path).map_err(|e| BazaarError::Journal(format!("Failed to read journal: {e}")))?;

        let (next_sequence, committed_len) = if existing.is_empty() {
            let mut header = Vec::with_capacity(HEADER_LEN);
            header.extend_from_slice(JOURNAL_MAGIC);
            header.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
            file.write_all(&header)
                .and_then(|()| file.sync_all())
                .map_err(|e| BazaarError::Journal(format!("Failed to write header: {e}")))?;
            (1, HEADER_LEN)
        } else {
            let (entries, valid_len) = scan(&existing)?;
            if valid_len < existing.len() {
                tracing::warn!(
                    "Journal {}: dropping {} bytes of torn tail",
                    path.display(),
                    existing.len() - valid_len
                );
            }
            let next = entries.last().map_or(1, |entry| entry.sequence + 1);
            (next, valid_len)
        };

        let committed_len = u64::try_from(committed_len).map_err(|_| BazaarError::Journal("journal too large".into()))?;
        file.set_len(committed_len)
            .and_then(|()| file.seek(SeekFrom::Start(committed_len)).map(|_| ()))
            .map_err(|e| BazaarError::Journal(format!("Failed to position journal: {e}")))?;

        Ok(Self {
            path,
            file,
            next_sequence,
            committed_len,
            sync_on_commit,
        })
    }

    /// Path of the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sequence number the next record will get.
    #[must_use]
    pub const fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Writes one operation's events as a single record.
    ///
    /// Returns the record's sequence number.
    ///
    /// # Errors
    ///
    /// `Journal` if the record cannot be written (and synced, when
    /// `sync_on_commit` is set). A partial record is cut off again.
    pub fn append(&mut self, events: &[BazaarEvent]) -> BazaarResult<u64> {
        let sequence = self.next_sequence;
        let record = encode_record(sequence, events)?;

        let written = self.file.write_all(&record).and_then(|()| {
            if self.sync_on_commit {
                self.file.sync_data()
            } else {
                Ok(())
            }
        });

        if let Err(e) = written {
            // Best effort: leave no torn record behind
            let _ = self.file.set_len(self.committed_len);
            let _ = self.file.seek(SeekFrom::Start(self.committed_len));
            return Err(BazaarError::Journal(format!("Journal write failed: {e}")));
        }

        self.committed_len += record.len() as u64;
        self.next_sequence += 1;
        tracing::debug!("Journal record {} ({} events, {} bytes)", sequence, events.len(), record.len());
        Ok(sequence)
    }

    /// Reads every intact record of a journal file.
    ///
    /// # Errors
    ///
    /// `Journal` if the file cannot be read or has a foreign header.
    pub fn read_all(path: impl AsRef<Path>) -> BazaarResult<Vec<JournalEntry>> {
        let data = std::fs::read(path.as_ref()).map_err(|e| BazaarError::Journal(format!("Failed to read journal: {e}")))?;
        scan(&data).map(|(entries, _)| entries)
    }
}

/// Parses the header and every intact record. Returns the entries and the
/// number of bytes they span.
fn scan(data: &[u8]) -> BazaarResult<(Vec<JournalEntry>, usize)> {
    if data.len() < HEADER_LEN || &data[..4] != JOURNAL_MAGIC {
        return Err(BazaarError::Journal("Invalid journal magic".into()));
    }
    let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    if version != JOURNAL_VERSION {
        return Err(BazaarError::Journal(format!("Unsupported journal version: {version}")));
    }

    let mut entries = Vec::new();
    let mut offset = HEADER_LEN;
    while let Some((entry, len)) = decode_record(&data[offset..]) {
        entries.push(entry);
        offset += len;
    }
    Ok((entries, offset))
}

fn encode_record(sequence: u64, events: &[BazaarEvent]) -> BazaarResult<Vec<u8>> {
    let mut payload = Encoder::default();
    payload.put_len(events.len())?;
    for event in events {
        payload.put_event(event)?;
    }
    let payload = payload.0;
    let len = u32::try_from(payload.len()).map_err(|_| BazaarError::Journal("record too large".into()))?;

    let mut record = Vec::with_capacity(RECORD_PREFIX_LEN + payload.len() + 4);
    record.extend_from_slice(&sequence.to_le_bytes());
    record.extend_from_slice(&len.to_le_bytes());
    record.extend_from_slice(&payload);
    let crc = crc32fast::hash(&record);
    record.extend_from_slice(&crc.to_le_bytes());
    Ok(record)
}

/// Decodes one record from the front of `data`. `None` on a torn, corrupt
/// or undecodable record.
fn decode_record(data: &[u8]) -> Option<(JournalEntry, usize)> {
    let mut cursor = Decoder::new(data);
    let sequence = cursor.u64()?;
    let len = usize::try_from(cursor.u32()?).ok()?;
    let payload = cursor.take(len)?;
    let stored_crc = cursor.u32()?;

    let body_len = RECORD_PREFIX_LEN + len;
    if crc32fast::hash(&data[..body_len]) != stored_crc {
        return None;
    }

    let mut events_cursor = Decoder::new(payload);
    let count = events_cursor.u32()?;
    let mut events = Vec::new();
    for _ in 0..count {
        events.push(events_cursor.event()?);
    }
    if !events_cursor.is_empty() {
        return None;
    }
    Some((JournalEntry { sequence, events }, body_len + 4))
}

// =============================================================================
// Binary codec
// =============================================================================

#[derive(Default)]
struct Encoder(Vec<u8>);

impl Encoder {
    fn put_u8(&mut self, v: u8) {
        self.0.push(v);
    }

    fn put_u32(&mut self, v: u32) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }

    fn put_u64(&mut self, v: u64) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }

    fn put_u128(&mut self, v: u128) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }

    fn put_pulse(&mut self, v: Pulse) {
        self.put_u128(v.raw());
    }

    fn put_address(&mut self, v: Address) {
        self.0.extend_from_slice(v.as_slice());
    }

    fn put_len(&mut self, len: usize) -> BazaarResult<()> {
        let len = u32::try_from(len).map_err(|_| BazaarError::Journal("length exceeds u32".into()))?;
        self.put_u32(len);
        Ok(())
    }

    fn put_str(&mut self, v: &str) -> BazaarResult<()> {
        self.put_len(v.len())?;
        self.0.extend_from_slice(v.as_bytes());
        Ok(())
    }

    fn put_event(&mut self, event: &BazaarEvent) -> BazaarResult<()> {
        match event {
            BazaarEvent::ItemKindRegistered { kind } => {
                self.put_u8(1);
                self.put_u32(*kind);
            }
            BazaarEvent::Ledger(record) => {
                self.put_u8(2);
                match record.operation {
                    LedgerOperation::Mint => self.put_u8(0),
                    LedgerOperation::Burn => self.put_u8(1),
                    LedgerOperation::Transfer { to } => {
                        self.put_u8(2);
                        self.put_address(to);
                    }
                }
                self.put_address(record.holder);
                self.put_u32(record.kind);
                self.put_u128(record.quantity);
            }
            BazaarEvent::CurrencyDeposited { account, amount } => {
                self.put_u8(3);
                self.put_address(*account);
                self.put_pulse(*amount);
            }
            BazaarEvent::FeeCollected { amount, source } => {
                self.put_u8(4);
                self.put_pulse(*amount);
                match source {
                    CollectionSource::MarketplaceFee => self.put_u8(0),
                    CollectionSource::VendorSale => self.put_u8(1),
                    CollectionSource::External(tag) => {
                        self.put_u8(2);
                        self.put_str(tag)?;
                    }
                }
            }
            BazaarEvent::FundsDisbursed { recipient, amount, reason } => {
                self.put_u8(5);
                self.put_address(*recipient);
                self.put_pulse(*amount);
                match reason {
                    DisbursementReason::Reward(tag) => {
                        self.put_u8(0);
                        self.put_str(tag)?;
                    }
                    DisbursementReason::Withdrawal => self.put_u8(1),
                }
            }
            BazaarEvent::ListingCreated { listing_id, seller, kind, quantity, unit_price, expires_at } => {
                self.put_u8(6);
                self.put_u64(*listing_id);
                self.put_address(*seller);
                self.put_u32(*kind);
                self.put_u128(*quantity);
                self.put_pulse(*unit_price);
                self.put_u64(*expires_at);
            }
            BazaarEvent::ListingSold { listing_id, buyer, quantity, total_price, fee } => {
                self.put_u8(7);
                self.put_u64(*listing_id);
                self.put_address(*buyer);
                self.put_u128(*quantity);
                self.put_pulse(*total_price);
                self.put_pulse(*fee);
            }
            BazaarEvent::ListingCancelled { listing_id, seller, returned } => {
                self.put_u8(8);
                self.put_u64(*listing_id);
                self.put_address(*seller);
                self.put_u128(*returned);
            }
            BazaarEvent::VendorRegistered { vendor_id, restock_cycle } => {
                self.put_u8(9);
                self.put_u32(*vendor_id);
                self.put_u64(*restock_cycle);
            }
            BazaarEvent::VendorItemAdded { vendor_id, kind, unit_price, max_stock } => {
                self.put_u8(10);
                self.put_u32(*vendor_id);
                self.put_u32(*kind);
                self.put_pulse(*unit_price);
                self.put_u128(*max_stock);
            }
            BazaarEvent::VendorStockReset { vendor_id, kinds, at } => {
                self.put_u8(11);
                self.put_u32(*vendor_id);
                self.put_len(kinds.len())?;
                for kind in kinds {
                    self.put_u32(*kind);
                }
                self.put_u64(*at);
            }
            BazaarEvent::VendorSale { vendor_id, buyer, kind, quantity, total_price } => {
                self.put_u8(12);
                self.put_u32(*vendor_id);
                self.put_address(*buyer);
                self.put_u32(*kind);
                self.put_u128(*quantity);
                self.put_pulse(*total_price);
            }
            BazaarEvent::RecipeAdded { recipe_id } => {
                self.put_u8(13);
                self.put_u32(*recipe_id);
            }
            BazaarEvent::ItemCrafted { crafter, recipe_id, times } => {
                self.put_u8(14);
                self.put_address(*crafter);
                self.put_u32(*recipe_id);
                self.put_u32(*times);
            }
        }
        Ok(())
    }
}

struct Decoder<'a> {
    data: &'a [u8],
}

impl<'a> Decoder<'a> {
    const fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.data.len() < n {
            return None;
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Some(head)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    fn u32(&mut self) -> Option<u32> {
        Some(u32::from_le_bytes(self.take(4)?.try_into().ok()?))
    }

    fn u64(&mut self) -> Option<u64> {
        Some(u64::from_le_bytes(self.take(8)?.try_into().ok()?))
    }

    fn u128(&mut self) -> Option<u128> {
        Some(u128::from_le_bytes(self.take(16)?.try_into().ok()?))
    }

    fn pulse(&mut self) -> Option<Pulse> {
        self.u128().map(Pulse::from_raw)
    }

    fn address(&mut self) -> Option<Address> {
        self.take(20).map(Address::from_slice)
    }

    fn string(&mut self) -> Option<String> {
        let len = usize::try_from(self.u32()?).ok()?;
        String::from_utf8(self.take(len)?.to_vec()).ok()
    }

    fn event(&mut self) -> Option<BazaarEvent> {
        let event = match self.u8()? {
            1 => BazaarEvent::ItemKindRegistered { kind: self.u32()? },
            2 => {
                let operation = match self.u8()? {
                    0 => LedgerOperation::Mint,
                    1 => LedgerOperation::Burn,
                    2 => LedgerOperation::Transfer { to: self.address()? },
                    _ => return None,
                };
                BazaarEvent::Ledger(LedgerRecord {
                    operation,
                    holder: self.address()?,
                    kind: self.u32()?,
                    quantity: self.u128()?,
                })
            }
            3 => BazaarEvent::CurrencyDeposited {
                account: self.address()?,
                amount: self.pulse()?,
            },
            4 => {
                let amount = self.pulse()?;
                let source = match self.u8()? {
                    0 => CollectionSource::MarketplaceFee,
                    1 => CollectionSource::VendorSale,
                    2 => CollectionSource::External(self.string()?),
                    _ => return None,
                };
                BazaarEvent::FeeCollected { amount, source }
            }
            5 => {
                let recipient = self.address()?;
                let amount = self.pulse()?;
                let reason = match self.u8()? {
                    0 => DisbursementReason::Reward(self.string()?),
                    1 => DisbursementReason::Withdrawal,
                    _ => return None,
                };
                BazaarEvent::FundsDisbursed { recipient, amount, reason }
            }
            6 => BazaarEvent::ListingCreated {
                listing_id: self.u64()?,
                seller: self.address()?,
                kind: self.u32()?,
                quantity: self.u128()?,
                unit_price: self.pulse()?,
                expires_at: self.u64()?,
            },
            7 => BazaarEvent::ListingSold {
                listing_id: self.u64()?,
                buyer: self.address()?,
                quantity: self.u128()?,
                total_price: self.pulse()?,
                fee: self.pulse()?,
            },
            8 => BazaarEvent::ListingCancelled {
                listing_id: self.u64()?,
                seller: self.address()?,
                returned: self.u128()?,
            },
            9 => BazaarEvent::VendorRegistered {
                vendor_id: self.u32()?,
                restock_cycle: self.u64()?,
            },
            10 => BazaarEvent::VendorItemAdded {
                vendor_id: self.u32()?,
                kind: self.u32()?,
                unit_price: self.pulse()?,
                max_stock: self.u128()?,
            },
            11 => {
                let vendor_id = self.u32()?;
                let count = self.u32()?;
                let kinds = (0..count).map(|_| self.u32()).collect::<Option<Vec<_>>>()?;
                BazaarEvent::VendorStockReset { vendor_id, kinds, at: self.u64()? }
            }
            12 => BazaarEvent::VendorSale {
                vendor_id: self.u32()?,
                buyer: self.address()?,
                kind: self.u32()?,
                quantity: self.u128()?,
                total_price: self.pulse()?,
            },
            13 => BazaarEvent::RecipeAdded { recipe_id: self.u32()? },
            14 => BazaarEvent::ItemCrafted {
                crafter: self.address()?,
                recipe_id: self.u32()?,
                times: self.u32()?,
            },
            _ => return None,
        };
        Some(event)
    }
}
