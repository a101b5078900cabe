//! Database methods for the agents table

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row};

use crate::db::Database;
use crate::error::Result;
use crate::models::{AgentQuery, AgentRecord};

const AGENT_COLUMNS: &str = "agent_id, chain_id, wallet_address, source_uri, name, description,
    capabilities, messaging_address, http_endpoint, mcp_endpoint, a2a_endpoint,
    payment_address, reputation_score, feedback_count, last_updated, indexed_at";

impl Database {
    /// Insert or fully replace the record for `(record.chain_id, record.agent_id)`.
    ///
    /// Single statement, so concurrent readers see either the old or the new row.
    pub fn upsert_agent(&self, record: &AgentRecord) -> Result<()> {
        let conn = self.conn()?;
        let capabilities = serde_json::to_string(&dedup_tags(&record.capabilities))
            .unwrap_or_else(|_| "[]".to_string());

        conn.execute(
            "INSERT INTO agents (
                agent_id, chain_id, wallet_address, source_uri, name, description,
                capabilities, messaging_address, http_endpoint, mcp_endpoint, a2a_endpoint,
                payment_address, reputation_score, feedback_count, last_updated, indexed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ON CONFLICT(chain_id, agent_id) DO UPDATE SET
                wallet_address = excluded.wallet_address,
                source_uri = excluded.source_uri,
                name = excluded.name,
                description = excluded.description,
                capabilities = excluded.capabilities,
                messaging_address = excluded.messaging_address,
                http_endpoint = excluded.http_endpoint,
                mcp_endpoint = excluded.mcp_endpoint,
                a2a_endpoint = excluded.a2a_endpoint,
                payment_address = excluded.payment_address,
                reputation_score = excluded.reputation_score,
                feedback_count = excluded.feedback_count,
                last_updated = excluded.last_updated,
                indexed_at = excluded.indexed_at",
            rusqlite::params![
                record.agent_id,
                record.chain_id,
                record.wallet_address,
                record.source_uri,
                record.name,
                record.description,
                capabilities,
                record.messaging_address,
                record.http_endpoint,
                record.mcp_endpoint,
                record.a2a_endpoint,
                record.payment_address,
                record.reputation_score,
                record.feedback_count,
                record.last_updated.map(|t| t.to_rfc3339()),
                record.indexed_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Registry ids are only unique within one chain.
    pub fn get_agent(&self, chain_id: u64, agent_id: u64) -> Result<Option<AgentRecord>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM agents WHERE chain_id = ?1 AND agent_id = ?2",
            AGENT_COLUMNS
        );
        let record = conn
            .query_row(&sql, [chain_id, agent_id], row_to_agent)
            .optional()?;
        Ok(record)
    }

    /// Delete a record. Returns true if it existed.
    pub fn remove_agent(&self, chain_id: u64, agent_id: u64) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "DELETE FROM agents WHERE chain_id = ?1 AND agent_id = ?2",
            [chain_id, agent_id],
        )?;
        Ok(rows > 0)
    }

    /// Rows across every chain.
    pub fn count_agents(&self) -> Result<u64> {
        let conn = self.conn()?;
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM agents", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn count_agents_on(&self, chain_id: u64) -> Result<u64> {
        let conn = self.conn()?;
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM agents WHERE chain_id = ?1",
            [chain_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Records matching every supplied filter, highest reputation first.
    ///
    /// Equal scores come back in no particular order.
    pub fn search_agents(&self, query: &AgentQuery) -> Result<Vec<AgentRecord>> {
        let conn = self.conn()?;
        let mut conditions = vec!["1=1".to_string()];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        let mut param_idx = 1u32;

        if let Some(chain_id) = query.chain_id {
            conditions.push(format!("chain_id = ?{}", param_idx));
            params.push(Box::new(chain_id));
            param_idx += 1;
        }
        if let Some(ref capability) = query.capability {
            conditions.push(format!("instr(capabilities, ?{}) > 0", param_idx));
            params.push(Box::new(capability.to_lowercase()));
            param_idx += 1;
        }
        if let Some(min_score) = query.min_score {
            conditions.push(format!("reputation_score >= ?{}", param_idx));
            params.push(Box::new(min_score));
            param_idx += 1;
        }

        let mut sql = format!(
            "SELECT {} FROM agents WHERE {} ORDER BY reputation_score DESC",
            AGENT_COLUMNS,
            conditions.join(" AND ")
        );
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT ?{}", param_idx));
            params.push(Box::new(limit as i64));
        }

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(param_refs.as_slice(), row_to_agent)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Top `n` by reputation on one chain.
    pub fn top_agents(&self, chain_id: u64, n: usize) -> Result<Vec<AgentRecord>> {
        self.search_agents(&AgentQuery::top(n).on_chain(chain_id))
    }
}

fn dedup_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        if !out.contains(tag) {
            out.push(tag.clone());
        }
    }
    out
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_agent(row: &Row) -> rusqlite::Result<AgentRecord> {
    let capabilities: String = row.get(6)?;
    let last_updated: Option<String> = row.get(14)?;
    let indexed_at: String = row.get(15)?;

    Ok(AgentRecord {
        agent_id: row.get(0)?,
        chain_id: row.get(1)?,
        wallet_address: row.get(2)?,
        source_uri: row.get(3)?,
        name: row.get(4)?,
        description: row.get(5)?,
        capabilities: serde_json::from_str(&capabilities)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?,
        messaging_address: row.get(7)?,
        http_endpoint: row.get(8)?,
        mcp_endpoint: row.get(9)?,
        a2a_endpoint: row.get(10)?,
        payment_address: row.get(11)?,
        reputation_score: row.get(12)?,
        feedback_count: row.get(13)?,
        last_updated: last_updated.as_deref().map(|t| parse_timestamp(14, t)).transpose()?,
        indexed_at: parse_timestamp(15, &indexed_at)?,
    })
}
