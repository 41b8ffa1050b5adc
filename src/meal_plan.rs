use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use tracing::{info, warn};

use crate::api_connection::candidate::parse_candidate_json;
use crate::api_connection::endpoints::{GenerateContentRequest, InlineData, Part};
use crate::api_connection::{ApiConnectionError, GeminiClient, Sleeper};
use crate::store::{sort_newest_first, CollectionPath, DocumentStore, StoreError};

pub const DEFAULT_SNACK: &str = "과일쥬스";

const PLAN_SYSTEM_PROMPT: &str = "You are a hospital dietitian's meal planning assistant. \
Answer with JSON only, shaped as: \
{ \"days\": [ { \"date\": \"1/12(Mon)\", \"breakfast\": [\"...\"], \"lunch\": [\"...\"], \"dinner\": [\"...\"], \"snack\": \"...\" } ] }. \
Cover seven consecutive days. Each meal lists rice, soup, a main dish, and two side dishes.";

const PLAN_USER_PROMPT: &str = "Create this week's hospital meal plan.";

const IMAGE_SYSTEM_PROMPT: &str = "You read photographed or scanned hospital menu sheets. \
Transcribe the menu into JSON only, shaped as: \
{ \"days\": [ { \"date\": \"...\", \"breakfast\": [\"...\"], \"lunch\": [\"...\"], \"dinner\": [\"...\"], \"snack\": \"...\" } ] }. \
Keep dish names exactly as printed.";

const IMAGE_USER_PROMPT: &str = "Transcribe this past menu so it can be learned from.";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DayMenu {
    pub date: String,
    #[serde(default)]
    pub breakfast: Vec<String>,
    #[serde(default)]
    pub lunch: Vec<String>,
    #[serde(default)]
    pub dinner: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snack: Option<String>,
}

impl DayMenu {
    pub fn snack_or_default(&self) -> &str {
        match self.snack.as_deref().map(str::trim) {
            Some(snack) if !snack.is_empty() => snack,
            _ => DEFAULT_SNACK,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct WeeklyPlan {
    pub days: Vec<DayMenu>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    Generated,
    MenuImage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub id: String,
    pub created_at: Option<u64>,
    pub plan: WeeklyPlan,
    pub source: Option<PlanSource>,
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryRecord {
    plan: Vec<DayMenu>,
    #[serde(default)]
    source: Option<PlanSource>,
    #[serde(rename = "userId", default)]
    user_id: Option<String>,
}

pub async fn generate_weekly_plan<S: Sleeper>(
    client: &GeminiClient<S>,
) -> Result<WeeklyPlan, ApiConnectionError> {
    let request = GenerateContentRequest::json_prompt(PLAN_SYSTEM_PROMPT, vec![Part::text(PLAN_USER_PROMPT)]);
    let response = client.generate_content(&request).await?;
    let plan: WeeklyPlan = parse_candidate_json(&response)?;
    info!(days = plan.days.len(), "weekly plan generated");
    Ok(plan)
}

/// Reads a past menu sheet out of an image so it can join the history.
pub async fn learn_from_menu_image<S: Sleeper>(
    client: &GeminiClient<S>,
    image: &[u8],
    mime_type: &str,
) -> Result<WeeklyPlan, ApiConnectionError> {
    let parts = vec![
        Part::text(IMAGE_USER_PROMPT),
        Part::Inline {
            inline_data: InlineData {
                mime_type: mime_type.to_string(),
                data: STANDARD.encode(image),
            },
        },
    ];
    let request = GenerateContentRequest::json_prompt(IMAGE_SYSTEM_PROMPT, parts);
    let response = client.generate_content(&request).await?;
    let plan: WeeklyPlan = parse_candidate_json(&response)?;
    info!(days = plan.days.len(), bytes = image.len(), "menu image transcribed");
    Ok(plan)
}

pub fn mime_type_for(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "heic" => Some("image/heic"),
        _ => None,
    }
}

pub fn record_plan(
    store: &mut dyn DocumentStore,
    namespace: &str,
    user_id: &str,
    plan: &WeeklyPlan,
    source: PlanSource,
) -> Result<String, StoreError> {
    let data = json!({
        "plan": plan.days,
        "source": source,
        "userId": user_id,
    });
    store.add(&CollectionPath::meal_history(namespace), data)
}

/// History entries, newest first. Documents that are not plans are skipped.
pub fn load_history(store: &dyn DocumentStore, namespace: &str) -> Result<Vec<HistoryEntry>, StoreError> {
    let mut documents = store.list(&CollectionPath::meal_history(namespace))?;
    sort_newest_first(&mut documents);

    let entries = documents
        .into_iter()
        .filter_map(|doc| match serde_json::from_value::<HistoryRecord>(doc.data) {
            Ok(record) => Some(HistoryEntry {
                id: doc.id,
                created_at: doc.created_at,
                plan: WeeklyPlan { days: record.plan },
                source: record.source,
                user_id: record.user_id,
            }),
            Err(e) => {
                warn!(id = %doc.id, error = %e, "skipping unreadable history document");
                None
            }
        })
        .collect();
    Ok(entries)
}

/// Plain-text rendering, one block per day.
pub fn render_plan(plan: &WeeklyPlan) -> String {
    let mut out = String::new();
    for day in &plan.days {
        out.push_str(&format!("== {} ==\n", day.date));
        out.push_str(&format!("  breakfast: {}\n", day.breakfast.join(", ")));
        out.push_str(&format!("  lunch:     {}\n", day.lunch.join(", ")));
        out.push_str(&format!("  dinner:    {}\n", day.dinner.join(", ")));
        out.push_str(&format!("  snack:     {}\n", day.snack_or_default()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, StoredDocument};

    fn day(date: &str, snack: Option<&str>) -> DayMenu {
        DayMenu {
            date: date.to_string(),
            breakfast: vec!["현미밥".to_string(), "미역국".to_string()],
            lunch: vec!["잡곡밥".to_string()],
            dinner: vec![],
            snack: snack.map(str::to_string),
        }
    }

    #[test]
    fn snack_defaults_to_juice() {
        assert_eq!(day("1/12", None).snack_or_default(), DEFAULT_SNACK);
        assert_eq!(day("1/12", Some("  ")).snack_or_default(), DEFAULT_SNACK);
        assert_eq!(day("1/12", Some("요구르트")).snack_or_default(), "요구르트");
    }

    #[test]
    fn plan_deserializes_with_missing_meals() {
        let plan: WeeklyPlan =
            serde_json::from_str(r#"{"days": [{"date": "1/12(월)", "lunch": ["비빔밥"]}]}"#).unwrap();
        assert_eq!(plan.days[0].lunch, vec!["비빔밥"]);
        assert!(plan.days[0].breakfast.is_empty());
        assert!(plan.days[0].snack.is_none());
    }

    #[test]
    fn mime_types_by_extension() {
        assert_eq!(mime_type_for(Path::new("menu.PNG")), Some("image/png"));
        assert_eq!(mime_type_for(Path::new("a/b/menu.jpeg")), Some("image/jpeg"));
        assert_eq!(mime_type_for(Path::new("menu.pdf")), None);
        assert_eq!(mime_type_for(Path::new("menu")), None);
    }

    #[test]
    fn history_is_newest_first_and_skips_foreign_documents() {
        let mut store = InMemoryStore::new();
        let plan = WeeklyPlan {
            days: vec![day("1/12", None)],
        };
        record_plan(&mut store, "ns", "u1", &plan, PlanSource::Generated).unwrap();
        store
            .add(&CollectionPath::meal_history("ns"), json!({"unrelated": true}))
            .unwrap();

        let history = load_history(&store, "ns").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].plan, plan);
        assert_eq!(history[0].source, Some(PlanSource::Generated));
        assert_eq!(history[0].user_id.as_deref(), Some("u1"));
    }

    #[test]
    fn history_order_follows_created_at() {
        struct Fixed(Vec<StoredDocument>);
        impl DocumentStore for Fixed {
            fn add(&mut self, _: &CollectionPath, _: serde_json::Value) -> Result<String, StoreError> {
                unreachable!()
            }
            fn set(&mut self, _: &crate::store::DocumentPath, _: serde_json::Value) -> Result<(), StoreError> {
                unreachable!()
            }
            fn get(&self, _: &crate::store::DocumentPath) -> Result<Option<StoredDocument>, StoreError> {
                Ok(None)
            }
            fn list(&self, _: &CollectionPath) -> Result<Vec<StoredDocument>, StoreError> {
                Ok(self.0.clone())
            }
        }

        let doc = |id: &str, at: Option<u64>| StoredDocument {
            id: id.to_string(),
            created_at: at,
            data: json!({"plan": [], "userId": "u"}),
        };
        let store = Fixed(vec![doc("old", Some(100)), doc("untimed", None), doc("new", Some(200))]);
        let ids: Vec<_> = load_history(&store, "ns")
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["new", "old", "untimed"]);
    }

    #[test]
    fn render_includes_every_meal() {
        let text = render_plan(&WeeklyPlan {
            days: vec![day("1/12(월)", None)],
        });
        assert!(text.contains("== 1/12(월) =="));
        assert!(text.contains("현미밥, 미역국"));
        assert!(text.contains(DEFAULT_SNACK));
    }
}
