//! Report Snapshot
//!
//! The flat field set handed to the renderer. A snapshot is built in one go
//! from the store and never modified afterwards.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::analytics::{self, PosterCount, ReportWindows};
use crate::graph;
use crate::store::EventStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub top_posters_day: Vec<PosterCount>,
    pub top_posters_previous_day: Vec<PosterCount>,
    pub top_posters_week: Vec<PosterCount>,

    pub hourly_day: Vec<usize>,
    pub hourly_previous_day: Vec<usize>,
    pub hourly_week: Vec<usize>,
    pub hourly_previous_week: Vec<usize>,

    /// Monday first, over the whole history
    pub weekday_averages: Vec<f64>,

    /// DOT text of the relationship graph
    pub graph: String,

    pub path_prefix: String,
}

impl Report {
    /// Query the store once per window and aggregate
    pub fn build(store: &EventStore, now: DateTime<Utc>, path_prefix: &str) -> Result<Self> {
        let windows = ReportWindows::at(now);

        let day = store.messages_between(windows.day.start, windows.day.end)?;
        let previous_day = store.messages_between(windows.previous_day.start, windows.previous_day.end)?;
        let week = store.messages_between(windows.week.start, windows.week.end)?;
        let previous_week =
            store.messages_between(windows.previous_week.start, windows.previous_week.end)?;
        let history = store.messages()?;
        let edges = store.edges()?;

        debug!(
            "Building report: {} message(s) today, {} this week, {} total, {} edge(s)",
            day.len(),
            week.len(),
            history.len(),
            edges.len()
        );

        Ok(Self {
            top_posters_day: analytics::top_posters(&day),
            top_posters_previous_day: analytics::top_posters(&previous_day),
            top_posters_week: analytics::top_posters(&week),
            hourly_day: analytics::messages_per_hour(&day),
            hourly_previous_day: analytics::messages_per_hour(&previous_day),
            hourly_week: analytics::messages_per_hour(&week),
            hourly_previous_week: analytics::messages_per_hour(&previous_week),
            weekday_averages: analytics::average_per_weekday(&history),
            graph: graph::serialize(&edges),
            path_prefix: path_prefix.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Edge, EventKind};
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_build_from_store() {
        let mut store = EventStore::open_in_memory().unwrap();
        // Friday afternoon
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap();

        store
            .with_session(|s| {
                s.add_event_at("alice", EventKind::Msg, now - Duration::hours(1))?;
                s.add_event_at("alice", EventKind::Msg, now - Duration::hours(2))?;
                s.add_event_at("bob", EventKind::Msg, now - Duration::days(1))?;
                s.add_event_at("carol", EventKind::Msg, now - Duration::days(7))?;
                s.add_event_at("dave", EventKind::Join, now)?;
                Ok(())
            })
            .unwrap();
        store.insert_edge(&Edge::new("bob", "alice")).unwrap();

        let report = Report::build(&store, now, "/pirc_bot").unwrap();

        assert_eq!(report.top_posters_day.len(), 1);
        assert_eq!(report.top_posters_day[0].pseudo, "alice");
        assert_eq!(report.top_posters_day[0].count, 2);
        assert_eq!(report.top_posters_previous_day[0].pseudo, "bob");
        assert_eq!(report.top_posters_week.len(), 2);

        assert_eq!(report.hourly_day[14], 1);
        assert_eq!(report.hourly_day[13], 1);
        assert_eq!(report.hourly_previous_week.iter().sum::<usize>(), 1);
        assert_eq!(report.weekday_averages[4], 1.5);
        assert!(report.graph.contains("\"alice\" -- \"bob\""));
        assert_eq!(report.path_prefix, "/pirc_bot");
    }

    #[test]
    fn test_empty_store_has_full_histograms() {
        let store = EventStore::open_in_memory().unwrap();
        let report = Report::build(&store, Utc::now(), "").unwrap();

        for hourly in [
            &report.hourly_day,
            &report.hourly_previous_day,
            &report.hourly_week,
            &report.hourly_previous_week,
        ] {
            assert_eq!(hourly.len(), 24);
        }
        assert_eq!(report.weekday_averages, vec![0.0; 7]);
        assert!(report.top_posters_week.is_empty());
    }

    #[test]
    fn test_serializes_contract_fields() {
        let store = EventStore::open_in_memory().unwrap();
        let report = Report::build(&store, Utc::now(), "/p").unwrap();
        let value = serde_json::to_value(&report).unwrap();

        for field in [
            "top_posters_day",
            "top_posters_previous_day",
            "top_posters_week",
            "hourly_day",
            "hourly_previous_day",
            "hourly_week",
            "hourly_previous_week",
            "weekday_averages",
            "graph",
            "path_prefix",
        ] {
            assert!(value.get(field).is_some(), "missing {}", field);
        }
    }
}
