//! CLI `stats` command — knowledge base overview.

use anyhow::Result;
use rusqlite::Connection;

use crate::config::ChronicleConfig;
use crate::registry::Pass;

/// Display knowledge base statistics in the terminal.
pub fn stats(config: &ChronicleConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = crate::db::open_database(&db_path)?;

    let total: u64 = count(&conn, "SELECT COUNT(*) FROM entities")?;
    let active: u64 = count(
        &conn,
        "SELECT COUNT(*) FROM entities WHERE superseded_by IS NULL",
    )?;
    let needs_review: u64 = count(
        &conn,
        "SELECT COUNT(*) FROM entities WHERE needs_review = 1 AND superseded_by IS NULL",
    )?;
    let citations: u64 = count(&conn, "SELECT COUNT(*) FROM citations")?;
    let links: u64 = count(
        &conn,
        "SELECT COUNT(*) FROM cross_references WHERE stale = 0",
    )?;
    let rejections: u64 = count(&conn, "SELECT COUNT(*) FROM rejections")?;
    let pending = crate::transcript::pending_sessions(&conn)?.len();

    println!("Chronicle Statistics");
    println!("{}", "=".repeat(40));
    println!("  Total entities:      {total}");
    println!("  Active:              {active}");
    println!("  Superseded:          {}", total - active);
    println!("  Needs review:        {needs_review}");
    println!();

    println!("By Pass:");
    for pass in Pass::ALL {
        let mut pass_count = 0u64;
        for category in pass.categories() {
            pass_count += conn.query_row(
                "SELECT COUNT(*) FROM entities WHERE category = ?1 AND superseded_by IS NULL",
                [category.as_str()],
                |row| row.get::<_, i64>(0),
            )? as u64;
        }
        println!("  {:<12} {}", pass.as_str(), pass_count);
    }
    println!();

    println!("Citations:             {citations}");
    println!("Cross-references:      {links}");
    println!("Rejected candidates:   {rejections}");
    println!("Pending sessions:      {pending}");

    if let Ok(meta) = std::fs::metadata(&db_path) {
        println!("Database size:         {} bytes", meta.len());
    }
    Ok(())
}

fn count(conn: &Connection, sql: &str) -> Result<u64> {
    Ok(conn.query_row(sql, [], |row| row.get::<_, i64>(0))? as u64)
}
