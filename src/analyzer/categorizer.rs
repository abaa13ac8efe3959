use crate::collector::tracker::IDLE_LABEL;
use crate::db::IntervalRecord;
use serde::Serialize;
use std::collections::HashMap;

pub const IDLE_CATEGORY: &str = "idle";
pub const OTHER_CATEGORY: &str = "other";

const TOP_LABELS_PER_CATEGORY: usize = 5;
const TOP_ACTIVITIES: usize = 10;

pub struct CategoryRule {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
}

/// Evaluated top to bottom; the first rule with a matching keyword wins.
pub const CATEGORY_RULES: [CategoryRule; 6] = [
    CategoryRule {
        name: "work",
        keywords: &[
            "office",
            "excel",
            "word",
            "powerpoint",
            "docs",
            "sheets",
            "slides",
            "email",
            "calendar",
        ],
    },
    CategoryRule {
        name: "communication",
        keywords: &[
            "whatsapp", "telegram", "discord", "slack", "teams", "zoom", "meet", "skype",
            "messages",
        ],
    },
    CategoryRule {
        name: "entertainment",
        keywords: &[
            "youtube", "netflix", "spotify", "twitch", "video", "music", "game",
        ],
    },
    CategoryRule {
        name: "productivity",
        keywords: &[
            "notion", "evernote", "trello", "asana", "jira", "todoist", "notes",
        ],
    },
    CategoryRule {
        name: "social_media",
        keywords: &[
            "facebook",
            "twitter",
            "instagram",
            "linkedin",
            "reddit",
            "tiktok",
        ],
    },
    CategoryRule {
        name: "development",
        keywords: &[
            "vscode",
            "code",
            "terminal",
            "github",
            "gitlab",
            "stackoverflow",
            "python",
            "javascript",
            "git",
        ],
    },
];

pub const PRODUCTIVE_CATEGORIES: [&str; 3] = ["work", "productivity", "development"];

pub fn category_names() -> Vec<&'static str> {
    CATEGORY_RULES
        .iter()
        .map(|rule| rule.name)
        .chain([IDLE_CATEGORY, OTHER_CATEGORY])
        .collect()
}

pub fn classify(record: &IntervalRecord) -> &'static str {
    if record.kind.is_idle() || record.label.trim().eq_ignore_ascii_case(IDLE_LABEL) {
        return IDLE_CATEGORY;
    }

    let label = record.label.to_lowercase();
    let detail = record.detail.to_lowercase();

    CATEGORY_RULES
        .iter()
        .find(|rule| {
            rule.keywords
                .iter()
                .any(|keyword| label.contains(keyword) || detail.contains(keyword))
        })
        .map(|rule| rule.name)
        .unwrap_or(OTHER_CATEGORY)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelCount {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorySummary {
    pub name: &'static str,
    pub seconds: i64,
    pub top_labels: Vec<LabelCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityTime {
    pub title: String,
    pub seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryBreakdown {
    pub interval_count: usize,
    pub total_seconds: i64,
    pub categories: Vec<CategorySummary>,
    pub top_activities: Vec<ActivityTime>,
}

impl CategoryBreakdown {
    pub fn seconds(&self, category: &str) -> i64 {
        self.categories
            .iter()
            .find(|summary| summary.name == category)
            .map(|summary| summary.seconds)
            .unwrap_or_default()
    }

    pub fn idle_seconds(&self) -> i64 {
        self.seconds(IDLE_CATEGORY)
    }

    pub fn active_seconds(&self) -> i64 {
        self.total_seconds - self.idle_seconds()
    }

    pub fn has_data(&self) -> bool {
        self.interval_count > 0
    }

    /// `round(10 * productive / active)`, or 0 with no active time.
    pub fn productivity_score(&self) -> u8 {
        let active = self.active_seconds();
        if active <= 0 {
            return 0;
        }

        let productive = PRODUCTIVE_CATEGORIES
            .iter()
            .map(|category| self.seconds(category))
            .sum::<i64>();

        ((10.0 * productive as f64 / active as f64).round() as i64).clamp(0, 10) as u8
    }
}

/// Seconds per title, kept in first-seen order.
#[derive(Debug, Default)]
pub struct ActivityTally {
    entries: Vec<ActivityTime>,
    positions: HashMap<String, usize>,
}

impl ActivityTally {
    pub fn add(&mut self, title: &str, seconds: i64) {
        match self.positions.get(title) {
            Some(&position) => self.entries[position].seconds += seconds,
            None => {
                self.positions.insert(title.to_string(), self.entries.len());
                self.entries.push(ActivityTime {
                    title: title.to_string(),
                    seconds,
                });
            }
        }
    }

    /// Longest first; ties stay in first-seen order.
    pub fn into_top(self, limit: usize) -> Vec<ActivityTime> {
        let mut entries = self.entries;
        entries.sort_by(|left, right| right.seconds.cmp(&left.seconds));
        entries.truncate(limit);
        entries
    }
}

#[derive(Default)]
struct CategoryTally {
    seconds: i64,
    labels: Vec<LabelCount>,
    positions: HashMap<String, usize>,
}

impl CategoryTally {
    fn add(&mut self, label: &str, seconds: i64) {
        self.seconds += seconds;
        match self.positions.get(label) {
            Some(&position) => self.labels[position].count += 1,
            None => {
                self.positions.insert(label.to_string(), self.labels.len());
                self.labels.push(LabelCount {
                    name: label.to_string(),
                    count: 1,
                });
            }
        }
    }
}

pub fn categorize(records: &[IntervalRecord]) -> CategoryBreakdown {
    let names = category_names();
    let mut tallies = names
        .iter()
        .map(|_| CategoryTally::default())
        .collect::<Vec<_>>();
    let mut activities = ActivityTally::default();

    for record in records {
        let seconds = record.duration_seconds.max(0);
        let category = classify(record);

        if let Some(position) = names.iter().position(|name| *name == category) {
            tallies[position].add(&record.label, seconds);
        }
        activities.add(&record.label, seconds);
    }

    // Stable sort keeps first-seen order among ties.
    let categories = names
        .into_iter()
        .zip(tallies)
        .map(|(name, mut tally)| {
            tally.labels.sort_by(|left, right| right.count.cmp(&left.count));
            tally.labels.truncate(TOP_LABELS_PER_CATEGORY);
            CategorySummary {
                name,
                seconds: tally.seconds,
                top_labels: tally.labels,
            }
        })
        .collect::<Vec<_>>();

    CategoryBreakdown {
        interval_count: records.len(),
        total_seconds: categories.iter().map(|summary| summary.seconds).sum(),
        categories,
        top_activities: activities.into_top(TOP_ACTIVITIES),
    }
}

#[cfg(test)]
mod tests {
    use super::{ActivityTally, IDLE_CATEGORY, OTHER_CATEGORY, categorize, category_names, classify};
    use crate::db::{IntervalKind, IntervalRecord};

    fn record(id: i64, kind: IntervalKind, label: &str, detail: &str, seconds: i64) -> IntervalRecord {
        IntervalRecord {
            id,
            started_at: 1_000 + id * 10,
            kind,
            label: label.to_string(),
            detail: detail.to_string(),
            duration_seconds: seconds,
        }
    }

    fn window(id: i64, label: &str, seconds: i64) -> IntervalRecord {
        record(id, IntervalKind::Window, label, "pid:1", seconds)
    }

    #[test]
    fn whatsapp_in_chrome_is_communication() {
        assert_eq!(
            classify(&window(1, "WhatsApp Web — Chrome", 5)),
            "communication"
        );
    }

    #[test]
    fn first_declared_category_wins_on_overlap() {
        // "docs" (work) and "github" (development) both match.
        assert_eq!(classify(&window(1, "GitHub Docs - Firefox", 5)), "work");
        assert_eq!(classify(&window(2, "main.rs - VSCode", 5)), "development");
    }

    #[test]
    fn idle_has_priority_over_keywords() {
        let idle = record(1, IntervalKind::Idle, "Idle", "idle_seconds:90", 30);
        assert_eq!(classify(&idle), IDLE_CATEGORY);

        let labelled = record(2, IntervalKind::Other("legacy".to_string()), "idle", "", 30);
        assert_eq!(classify(&labelled), IDLE_CATEGORY);
    }

    #[test]
    fn detail_is_searched_too() {
        let input = record(1, IntervalKind::TextInput, "gedit", "trello card draft", 5);
        assert_eq!(classify(&input), "productivity");
        assert_eq!(classify(&window(2, "Calculator", 5)), OTHER_CATEGORY);
    }

    #[test]
    fn empty_day_has_zero_totals() {
        let breakdown = categorize(&[]);

        assert!(!breakdown.has_data());
        assert_eq!(breakdown.total_seconds, 0);
        assert!(breakdown.categories.iter().all(|summary| summary.seconds == 0));
        assert_eq!(breakdown.categories.len(), category_names().len());
        assert!(breakdown.top_activities.is_empty());
        assert_eq!(breakdown.productivity_score(), 0);
    }

    #[test]
    fn totals_and_rankings() {
        let records = vec![
            window(1, "Slack | general", 100),
            window(2, "main.rs - VSCode", 600),
            window(3, "Slack | random", 50),
            window(4, "Slack | general", 100),
            record(5, IntervalKind::Idle, "Idle", "idle_seconds:70", 300),
            window(6, "Calculator", 20),
            window(7, "Slack | random", 10),
            window(8, "Slack | dev", 500),
        ];

        let breakdown = categorize(&records);

        assert_eq!(breakdown.total_seconds, 1680);
        assert_eq!(breakdown.seconds("communication"), 760);
        assert_eq!(breakdown.seconds("development"), 600);
        assert_eq!(breakdown.idle_seconds(), 300);
        assert_eq!(breakdown.seconds(OTHER_CATEGORY), 20);
        assert_eq!(breakdown.active_seconds(), 1380);

        let communication = breakdown
            .categories
            .iter()
            .find(|summary| summary.name == "communication")
            .expect("communication");
        let ranked = communication
            .top_labels
            .iter()
            .map(|entry| (entry.name.as_str(), entry.count))
            .collect::<Vec<_>>();
        assert_eq!(
            ranked,
            vec![
                ("Slack | general", 2),
                ("Slack | random", 2),
                ("Slack | dev", 1)
            ]
        );

        let top = breakdown
            .top_activities
            .iter()
            .map(|entry| (entry.title.as_str(), entry.seconds))
            .collect::<Vec<_>>();
        assert_eq!(
            top,
            vec![
                ("main.rs - VSCode", 600),
                ("Slack | dev", 500),
                ("Idle", 300),
                ("Slack | general", 200),
                ("Slack | random", 60),
                ("Calculator", 20),
            ]
        );
    }

    #[test]
    fn top_labels_and_activities_are_bounded() {
        let records = (0..30)
            .map(|n| window(n, &format!("Terminal {n}"), n))
            .collect::<Vec<_>>();

        let breakdown = categorize(&records);
        let development = breakdown
            .categories
            .iter()
            .find(|summary| summary.name == "development")
            .expect("development");

        assert_eq!(development.top_labels.len(), 5);
        assert_eq!(development.top_labels[0].name, "Terminal 0");
        assert_eq!(breakdown.top_activities.len(), 10);
        assert_eq!(breakdown.top_activities[0].title, "Terminal 29");
    }

    #[test]
    fn productivity_score_rounds_over_active_time() {
        let records = vec![
            window(1, "Quarterly report - Word", 65),
            window(2, "YouTube", 35),
            record(3, IntervalKind::Idle, "Idle", "", 1_000),
        ];

        // 10 * 65 / 100 = 6.5 -> 7
        assert_eq!(categorize(&records).productivity_score(), 7);
    }

    #[test]
    fn classification_is_deterministic() {
        let records = vec![
            window(1, "Notion - Roadmap", 40),
            window(2, "reddit - Firefox", 15),
            window(3, "Zoom Meeting", 25),
        ];

        assert_eq!(categorize(&records), categorize(&records));
    }

    #[test]
    fn tally_merges_repeats_and_keeps_first_seen_ties() {
        let mut tally = ActivityTally::default();
        for n in 0..500 {
            tally.add(&format!("tab {}", n % 250), 1);
        }
        tally.add("tab 7", 5);

        let top = tally.into_top(3);
        let ranked = top
            .iter()
            .map(|entry| (entry.title.as_str(), entry.seconds))
            .collect::<Vec<_>>();
        assert_eq!(ranked, vec![("tab 7", 7), ("tab 0", 2), ("tab 1", 2)]);
    }
}
