//! Persistence gateway.
//!
//! The engine only ever needs four things from storage: record a casual game, record
//! a bracket match, and read a player's history and stats back. [`MemoryStore`]
//! keeps everything in memory and can mirror each record into an append-only
//! journal of length-prefixed `bincode` frames, replayed on start.

use arena_shared::protocol::{HistoryEntry, HistoryPage, PlayerStats};
use arena_shared::{MatchId, ParticipantId, UserId};
use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// One durable fact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    CasualGame {
        host: UserId,
        guest: UserId,
        host_score: u32,
        guest_score: u32,
        winner: Option<UserId>,
        played_at: u64,
    },
    TournamentMatch {
        match_id: MatchId,
        score1: u32,
        score2: u32,
        winner: Option<ParticipantId>,
        recorded_at: u64,
    },
}

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn record_casual_game(
        &self,
        host: UserId,
        guest: UserId,
        host_score: u32,
        guest_score: u32,
        winner: Option<UserId>,
    ) -> Result<(), StoreError>;

    async fn record_tournament_match(
        &self,
        match_id: MatchId,
        score1: u32,
        score2: u32,
        winner: Option<ParticipantId>,
    ) -> Result<(), StoreError>;

    /// Casual games of `user`, newest first. `page` starts at 1.
    async fn fetch_match_history(
        &self,
        user: UserId,
        page: u32,
        limit: u32,
    ) -> Result<HistoryPage, StoreError>;

    async fn fetch_stats(&self, user: UserId) -> Result<PlayerStats, StoreError>;
}

pub struct MemoryStore {
    records: RwLock<Vec<Record>>,
    journal: Option<Mutex<File>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// A store without a journal; everything is lost on exit.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            journal: None,
        }
    }

    /// Opens (or creates) a journal and replays the records already in it.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let records = match tokio::fs::read(path).await {
            Ok(bytes) => decode_journal(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        info!("Replayed {} records from {}", records.len(), path.display());

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;

        Ok(Self {
            records: RwLock::new(records),
            journal: Some(Mutex::new(file)),
        })
    }

    pub async fn records(&self) -> Vec<Record> {
        self.records.read().await.clone()
    }

    async fn append(&self, record: Record) -> Result<(), StoreError> {
        if let Some(journal) = &self.journal {
            let frame = encode_record(&record)?;
            let mut file = journal.lock().await;
            file.write_all(&frame).await?;
            file.flush().await?;
        }
        self.records.write().await.push(record);
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for MemoryStore {
    async fn record_casual_game(
        &self,
        host: UserId,
        guest: UserId,
        host_score: u32,
        guest_score: u32,
        winner: Option<UserId>,
    ) -> Result<(), StoreError> {
        self.append(Record::CasualGame {
            host,
            guest,
            host_score,
            guest_score,
            winner,
            played_at: now_secs(),
        })
        .await
    }

    async fn record_tournament_match(
        &self,
        match_id: MatchId,
        score1: u32,
        score2: u32,
        winner: Option<ParticipantId>,
    ) -> Result<(), StoreError> {
        self.append(Record::TournamentMatch {
            match_id,
            score1,
            score2,
            winner,
            recorded_at: now_secs(),
        })
        .await
    }

    async fn fetch_match_history(
        &self,
        user: UserId,
        page: u32,
        limit: u32,
    ) -> Result<HistoryPage, StoreError> {
        let records = self.records.read().await;
        Ok(history_page(&records, user, page, limit))
    }

    async fn fetch_stats(&self, user: UserId) -> Result<PlayerStats, StoreError> {
        let records = self.records.read().await;
        Ok(player_stats(&records, user))
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Frames a record as a little endian `u32` length followed by its `bincode` body.
pub fn encode_record(record: &Record) -> Result<Vec<u8>, StoreError> {
    let body = bincode::serialize(record)?;
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decodes a whole journal. A torn final frame, left by a crash mid-write, is skipped.
pub fn decode_journal(mut bytes: &[u8]) -> Result<Vec<Record>, StoreError> {
    let mut records = Vec::new();
    while !bytes.is_empty() {
        if bytes.len() < 4 {
            warn!("Journal ends with a torn length prefix, ignoring {} bytes", bytes.len());
            break;
        }
        let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        let rest = &bytes[4..];
        if rest.len() < len {
            warn!("Journal ends with a torn record, ignoring {} bytes", bytes.len());
            break;
        }
        records.push(bincode::deserialize(&rest[..len])?);
        bytes = &rest[len..];
    }
    Ok(records)
}

fn casual_games_of(records: &[Record], user: UserId) -> impl Iterator<Item = HistoryEntry> + '_ {
    records.iter().rev().filter_map(move |record| match record {
        Record::CasualGame {
            host,
            guest,
            host_score,
            guest_score,
            winner,
            played_at,
        } if *host == user || *guest == user => {
            let (opponent_id, my_score, opponent_score) = if *host == user {
                (*guest, *host_score, *guest_score)
            } else {
                (*host, *guest_score, *host_score)
            };
            Some(HistoryEntry {
                opponent_id,
                my_score,
                opponent_score,
                is_win: *winner == Some(user),
                is_draw: winner.is_none(),
                played_at: *played_at,
            })
        }
        _ => None,
    })
}

fn history_page(records: &[Record], user: UserId, page: u32, limit: u32) -> HistoryPage {
    let page = page.max(1);
    let limit = limit.clamp(1, MAX_PAGE_SIZE);

    let games: Vec<HistoryEntry> = casual_games_of(records, user).collect();
    let total = games.len() as u32;
    let total_pages = total.div_ceil(limit);
    let offset = u64::from(page - 1) * u64::from(limit);
    let entries = games
        .into_iter()
        .skip(usize::try_from(offset).unwrap_or(usize::MAX))
        .take(limit as usize)
        .collect();

    HistoryPage {
        entries,
        page,
        limit,
        total,
        total_pages,
    }
}

fn player_stats(records: &[Record], user: UserId) -> PlayerStats {
    let mut stats = PlayerStats {
        total_games: 0,
        wins: 0,
        losses: 0,
        draws: 0,
        win_rate: 0.0,
    };
    for game in casual_games_of(records, user) {
        stats.total_games += 1;
        if game.is_win {
            stats.wins += 1;
        } else if game.is_draw {
            stats.draws += 1;
        } else {
            stats.losses += 1;
        }
    }
    if stats.total_games > 0 {
        let rate = stats.wins as f64 / stats.total_games as f64 * 100.0;
        stats.win_rate = (rate * 10.0).round() / 10.0;
    }
    stats
}
