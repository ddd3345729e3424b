//! Plain-text rendering for command output.

use konakore_metadata::models::{JobStateRow, PostCounts};
use konakore_remote::{HealthResponse, TriggerResponse};
use std::fmt::Write;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

fn format_time(at: Option<OffsetDateTime>) -> String {
    at.and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| "never".to_string())
}

pub fn render_trigger(response: &TriggerResponse) -> String {
    format!("{}: {}", response.status, response.message)
}

pub fn render_health(health: &HealthResponse) -> String {
    let checked = OffsetDateTime::from_unix_timestamp(health.timestamp).ok();
    format!(
        "Status: {}\nSync running: {}\nChecked at: {}",
        health.status,
        if health.sync_running { "yes" } else { "no" },
        format_time(checked)
    )
}

pub fn render_jobs(rows: &[JobStateRow]) -> String {
    if rows.is_empty() {
        return "No job state recorded".to_string();
    }
    let mut out = String::new();
    for row in rows {
        let _ = writeln!(out, "{}", row.job_name);
        let _ = writeln!(out, "  Last run: {}", format_time(row.last_run_at));
        let _ = writeln!(out, "  State: {}", row.state);
    }
    out.trim_end().to_string()
}

/// Counts shown by `konactl stats`.
#[derive(Debug, Default)]
pub struct Stats {
    pub posts: PostCounts,
    pub tags: i64,
    pub edges: i64,
    pub file_sync: Vec<(String, i64)>,
}

pub fn render_stats(stats: &Stats) -> String {
    let mut out = String::from("Catalog:\n");
    let _ = writeln!(out, "  Posts: {}", stats.posts.total);
    let _ = writeln!(out, "  Processed: {}", stats.posts.processed);
    let _ = writeln!(out, "  Liked: {}", stats.posts.liked);
    let _ = writeln!(out, "  Tags: {}", stats.tags);
    let _ = writeln!(out, "  Post tags: {}", stats.edges);
    out.push_str("File sync:");
    if stats.file_sync.is_empty() {
        out.push_str(" none");
    }
    for (status, count) in &stats.file_sync {
        let _ = write!(out, "\n  {status}: {count}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_jobs() {
        let rows = vec![JobStateRow {
            job_name: "sync-recent".to_string(),
            state: json!({"current_page": 4}),
            last_run_at: None,
        }];
        let text = render_jobs(&rows);
        assert!(text.starts_with("sync-recent\n"));
        assert!(text.contains("Last run: never"));
        assert!(text.contains(r#"{"current_page":4}"#));
        assert_eq!(render_jobs(&[]), "No job state recorded");
    }

    #[test]
    fn test_render_stats() {
        let stats = Stats {
            posts: PostCounts {
                total: 10,
                processed: 7,
                liked: 2,
            },
            tags: 5,
            edges: 20,
            file_sync: vec![("COMPLETE".to_string(), 2)],
        };
        let text = render_stats(&stats);
        assert!(text.contains("Posts: 10"));
        assert!(text.contains("Post tags: 20"));
        assert!(text.ends_with("COMPLETE: 2"));

        let empty = render_stats(&Stats::default());
        assert!(empty.ends_with("File sync: none"));
    }

    #[test]
    fn test_render_health() {
        let health = HealthResponse {
            status: "healthy".to_string(),
            sync_running: true,
            timestamp: 0,
        };
        let text = render_health(&health);
        assert!(text.contains("Sync running: yes"));
        assert!(text.contains("1970-01-01T00:00:00Z"));
    }
}
