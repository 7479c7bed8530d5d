use clap::{Parser, Subcommand};
use nearby_core::feed::FileFeed;
use nearby_core::store::CandidateSource;
use nearby_core::{
    format_distance, hex_to_bytes, match_candidates, AlertPreferences, AlertRecord, Coordinate,
    ProximityResult, ResourceCategory, TrackedEntity,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const DEFAULT_QUERY_RADIUS_MILES: f64 = 1.0;

#[derive(Parser, Debug)]
#[command(about = "Inspect nearby alert logs and query a candidate feed")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summarize an alert log written by `nearby`
    Log {
        path: PathBuf,

        #[arg(long)]
        json: bool,
    },
    /// List feed entries around a point, nearest first
    Nearby {
        #[arg(long)]
        feed: PathBuf,

        #[arg(long)]
        secret_hex: Option<String>,

        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        #[arg(long, default_value_t = DEFAULT_QUERY_RADIUS_MILES)]
        radius: f64,

        /// Restrict to these categories; everything in range when omitted
        #[arg(long)]
        category: Vec<String>,

        /// Case-insensitive match on name or category label
        #[arg(long)]
        search: Option<String>,

        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct Nearest {
    key: String,
    name: String,
    distance_miles: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct LogSummary {
    records: usize,
    unique_entities: usize,
    urgent: usize,
    os_delivered: usize,
    by_category: BTreeMap<String, usize>,
    /// Keys that fired more than once across sessions.
    repeats: BTreeMap<String, usize>,
    nearest: Option<Nearest>,
    first_ts_unix_ms: Option<i64>,
    last_ts_unix_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRow {
    id: String,
    kind: String,
    category: String,
    name: String,
    distance_miles: f64,
    distance: String,
    latitude: f64,
    longitude: f64,
}

fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Command::Log { path, json } => {
            let records = load_jsonl(&path)?;
            let summary = summarize(&records);
            if json {
                print_json(&summary)?;
            } else {
                print_summary(&path, &summary);
            }
        }
        Command::Nearby {
            feed,
            secret_hex,
            lat,
            lon,
            radius,
            category,
            search,
            json,
        } => {
            let origin = Coordinate::new(lat, lon);
            if !origin.is_valid() {
                return Err(invalid("lat/lon out of range"));
            }
            if !radius.is_finite() || radius <= 0.0 {
                return Err(invalid("radius must be > 0"));
            }
            let secret = match secret_hex {
                Some(hex) => Some(hex_to_bytes(&hex).map_err(invalid)?),
                None => None,
            };

            let prefs = query_preferences(radius, &category);
            let entities = FileFeed::new(feed, secret)
                .fetch(&prefs.candidate_filter())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            debug!(count = entities.len(), "feed loaded");

            let results = match_candidates(origin, &entities, &prefs);
            let rows: Vec<QueryRow> = results
                .iter()
                .filter(|r| matches_search(r, search.as_deref()))
                .map(query_row)
                .collect();
            if json {
                print_json(&rows)?;
            } else {
                print_rows(&rows, radius);
            }
        }
    }
    Ok(())
}

fn load_jsonl(path: &PathBuf) -> io::Result<Vec<AlertRecord>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AlertRecord>(&line) {
            Ok(rec) => out.push(rec),
            Err(err) => debug!("skipping bad log line: {err}"),
        }
    }
    Ok(out)
}

fn summarize(records: &[AlertRecord]) -> LogSummary {
    let mut by_category = BTreeMap::new();
    let mut per_key: BTreeMap<String, usize> = BTreeMap::new();
    let mut entities = HashSet::new();
    let mut nearest: Option<&AlertRecord> = None;

    for rec in records {
        *by_category.entry(rec.category.clone()).or_insert(0) += 1;
        *per_key.entry(rec.key.clone()).or_insert(0) += 1;
        entities.insert((rec.kind.as_str(), rec.entity_id.as_str()));
        if rec.distance_miles.is_finite()
            && nearest.map_or(true, |n| rec.distance_miles < n.distance_miles)
        {
            nearest = Some(rec);
        }
    }

    LogSummary {
        records: records.len(),
        unique_entities: entities.len(),
        urgent: records.iter().filter(|r| r.urgent).count(),
        os_delivered: records.iter().filter(|r| r.os_delivered).count(),
        by_category,
        repeats: per_key.into_iter().filter(|(_, n)| *n > 1).collect(),
        nearest: nearest.map(|n| Nearest {
            key: n.key.clone(),
            name: n.name.clone(),
            distance_miles: n.distance_miles,
        }),
        first_ts_unix_ms: records.iter().map(|r| r.ts_unix_ms).min(),
        last_ts_unix_ms: records.iter().map(|r| r.ts_unix_ms).max(),
    }
}

fn print_summary(path: &PathBuf, s: &LogSummary) {
    println!("{}: {} alerts, {} entities", path.display(), s.records, s.unique_entities);
    if s.records == 0 {
        return;
    }
    println!("  urgent={} os_delivered={}", s.urgent, s.os_delivered);
    if let (Some(first), Some(last)) = (s.first_ts_unix_ms, s.last_ts_unix_ms) {
        println!("  span={:.1}min", (last - first) as f64 / 60_000.0);
    }
    println!("\nby category:");
    for (category, count) in &s.by_category {
        println!("- {} {}", category, count);
    }
    if let Some(n) = &s.nearest {
        println!("\nnearest: {} ({}) {}", n.name, n.key, format_distance(n.distance_miles));
    }
    if !s.repeats.is_empty() {
        println!("\nrepeated across sessions:");
        for (key, count) in &s.repeats {
            println!("- {} x{}", key, count);
        }
    }
}

fn query_preferences(radius: f64, categories: &[String]) -> AlertPreferences {
    AlertPreferences {
        enabled_categories: categories.iter().cloned().collect(),
        radius_miles: radius,
        enabled: true,
        radius_only: categories.is_empty(),
    }
}

fn matches_search(result: &ProximityResult, search: Option<&str>) -> bool {
    let Some(needle) = search.map(str::trim).filter(|s| !s.is_empty()) else {
        return true;
    };
    let needle = needle.to_lowercase();
    if result.entity.display_name().to_lowercase().contains(&needle) {
        return true;
    }
    match &result.entity {
        TrackedEntity::Resource(r) => {
            r.category.label().to_lowercase().contains(&needle)
                || r.city.as_deref().is_some_and(|c| c.to_lowercase().contains(&needle))
        }
        TrackedEntity::Profile(p) => p
            .urgent_title
            .as_deref()
            .is_some_and(|t| t.to_lowercase().contains(&needle)),
    }
}

fn query_row(result: &ProximityResult) -> QueryRow {
    let coordinate = result.entity.coordinate();
    QueryRow {
        id: result.entity.id().to_string(),
        kind: result.entity.kind().as_str().to_string(),
        category: result.category.clone(),
        name: result.entity.display_name().to_string(),
        distance_miles: result.distance_miles,
        distance: format_distance(result.distance_miles),
        latitude: coordinate.latitude,
        longitude: coordinate.longitude,
    }
}

fn print_rows(rows: &[QueryRow], radius: f64) {
    println!("{} within {:.2} mi:", rows.len(), radius);
    for row in rows {
        let label = ResourceCategory::parse(&row.category)
            .map(|c| c.label())
            .unwrap_or(row.category.as_str());
        println!("- {:>8}  {} [{}]", row.distance, row.name, label);
    }
}

fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    println!("{}", text);
    Ok(())
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nearby_core::feed::{sign_feed, signature_path};
    use nearby_core::{EntityKind, ResourceEntity};
    use std::fs;
    use std::io::Write;

    const TEST_EPSILON: f64 = 1e-9;
    const TEST_SECRET_HEX: &str = "00112233445566778899aabbccddeeff";
    const FEED: &str = r#"{
        "profiles": [{"id": "p1", "publicName": "Dana", "latitude": 26.645, "longitude": -81.87,
                      "isActive": true, "enableProximityAlerts": true, "hasUrgentNeed": true,
                      "urgentNeedTitle": "Insulin refill"}],
        "resources": [
            {"id": "r1", "name": "Park spigot", "type": "water_spigot", "latitude": 26.6405,
             "longitude": -81.87, "status": "active", "visibility": "community", "city": "Fort Myers"},
            {"id": "r2", "name": "Library wifi", "type": "wifi_hotspot", "latitude": 26.70,
             "longitude": -81.87, "status": "active", "visibility": "community"}
        ]
    }"#;

    fn record(key: &str, category: &str, distance: f64, ts: i64) -> AlertRecord {
        let id = key.split(':').nth(1).unwrap_or(key).to_string();
        AlertRecord {
            ts_unix_ms: ts,
            key: key.to_string(),
            entity_id: id,
            kind: if category == "urgent" || category == "profile" {
                EntityKind::Profile
            } else {
                EntityKind::Resource
            },
            category: category.to_string(),
            name: key.to_string(),
            distance_miles: distance,
            latitude: 26.64,
            longitude: -81.87,
            accuracy_m: None,
            urgent: category == "urgent",
            os_delivered: false,
            link: String::new(),
        }
    }

    #[test]
    fn summary_counts_categories_and_repeats() {
        let records = vec![
            record("urgent:p1", "urgent", 0.3, 1_000),
            record("water_spigot:r1", "water_spigot", 0.05, 2_000),
            record("urgent:p1", "urgent", 0.28, 61_000),
        ];
        let s = summarize(&records);
        assert_eq!(s.records, 3);
        assert_eq!(s.unique_entities, 2);
        assert_eq!(s.urgent, 2);
        assert_eq!(s.by_category["urgent"], 2);
        assert_eq!(s.repeats.get("urgent:p1"), Some(&2));
        assert!(!s.repeats.contains_key("water_spigot:r1"));
        let nearest = s.nearest.unwrap();
        assert_eq!(nearest.key, "water_spigot:r1");
        assert!((nearest.distance_miles - 0.05).abs() < TEST_EPSILON);
        assert_eq!(s.first_ts_unix_ms, Some(1_000));
        assert_eq!(s.last_ts_unix_ms, Some(61_000));
    }

    #[test]
    fn empty_log_has_no_nearest() {
        let s = summarize(&[]);
        assert_eq!(s.records, 0);
        assert!(s.nearest.is_none());
    }

    #[test]
    fn load_jsonl_skips_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.jsonl");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "{}", serde_json::to_string(&record("urgent:p1", "urgent", 0.3, 1)).unwrap()).unwrap();
        writeln!(file, "not json").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "{}", serde_json::to_string(&record("shower:r5", "shower", 0.4, 2)).unwrap()).unwrap();
        drop(file);

        let records = load_jsonl(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].key, "shower:r5");
    }

    #[test]
    fn query_lists_in_range_nearest_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.json");
        fs::write(&path, FEED).unwrap();
        let secret = hex_to_bytes(TEST_SECRET_HEX).unwrap();
        fs::write(signature_path(&path), sign_feed(FEED.as_bytes(), &secret)).unwrap();

        let prefs = query_preferences(1.0, &[]);
        let entities = FileFeed::new(&path, Some(secret))
            .fetch(&prefs.candidate_filter())
            .unwrap();
        let results = match_candidates(Coordinate::new(26.64, -81.87), &entities, &prefs);
        let ids: Vec<&str> = results.iter().map(|r| r.entity.id()).collect();
        assert_eq!(ids, vec!["r1", "p1"]);
        assert_eq!(query_row(&results[0]).distance, "182 ft");
    }

    #[test]
    fn search_matches_name_label_and_city() {
        let result = ProximityResult {
            entity: TrackedEntity::Resource(ResourceEntity {
                id: "r1".to_string(),
                name: "Park spigot".to_string(),
                coordinate: Coordinate::new(26.64, -81.87),
                category: ResourceCategory::WaterSpigot,
                city: Some("Fort Myers".to_string()),
            }),
            category: "water_spigot".to_string(),
            distance_miles: 0.1,
        };
        assert!(matches_search(&result, None));
        assert!(matches_search(&result, Some("  ")));
        assert!(matches_search(&result, Some("SPIGOT")));
        assert!(matches_search(&result, Some("water")));
        assert!(matches_search(&result, Some("myers")));
        assert!(!matches_search(&result, Some("shower")));
    }

    #[test]
    fn category_filter_narrows_query() {
        let prefs = query_preferences(5.0, &["wifi_hotspot".to_string()]);
        assert!(!prefs.radius_only);
        let filter = prefs.candidate_filter();
        assert!(filter.resources);
        assert!(!filter.profiles);
    }
}
