use serde_json::Value;

use crate::analysis::vision::RawVisionResponse;
use crate::domain::nutrition::{FoodItem, Macros, Nutrition};
use crate::error::{CoreError, CoreResult};

/// Parse model output as JSON, tolerating markdown code fences and leading prose.
pub fn parse_lenient_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Some(v);
    }
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim);
    if let Some(s) = unfenced {
        if let Ok(v) = serde_json::from_str::<Value>(s) {
            return Some(v);
        }
    }
    // Last resort: first '{' to last '}'.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    serde_json::from_str(&trimmed[start..=end]).ok()
}

fn num(value: &Value, key: &str) -> f64 {
    value.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn macros_of(food: &Value) -> CoreResult<Macros> {
    let m = food.get("macros").cloned().unwrap_or(Value::Null);
    Macros::new(
        num(&m, "protein"),
        num(&m, "carbs"),
        num(&m, "fat"),
        m.get("fiber").and_then(Value::as_f64),
    )
}

fn food_item_of(food: &Value) -> CoreResult<FoodItem> {
    let name = food
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| CoreError::parsing("food entry is missing required field 'name'"))?;

    // Models sometimes omit portion data; 1 serving keeps the quantity invariant.
    let (quantity, unit) = match food.get("quantity").and_then(Value::as_f64) {
        Some(q) if q > 0.0 => (
            q,
            food.get("unit")
                .and_then(Value::as_str)
                .unwrap_or("g")
                .to_string(),
        ),
        _ => (1.0, "serving".to_string()),
    };

    let macros = macros_of(food)?;
    let calories = match food.get("calories").and_then(Value::as_f64) {
        Some(c) => c,
        None => macros.total_calories(),
    };
    let confidence = food.get("confidence").and_then(Value::as_f64).unwrap_or(0.5);

    FoodItem::new(
        name,
        quantity,
        unit,
        calories.max(0.0),
        macros,
        None,
        confidence,
        food.get("fdc_id").and_then(Value::as_str).map(String::from),
        false,
    )
}

fn structured_payload(raw: &RawVisionResponse) -> CoreResult<Value> {
    if let Some(v) = &raw.structured {
        return Ok(v.clone());
    }
    raw.text
        .as_deref()
        .and_then(parse_lenient_json)
        .ok_or_else(|| CoreError::parsing("vision response contains no structured payload"))
}

/// Turn the vision response into validated Nutrition. Fails only when the
/// structured payload is absent or a food entry lacks its required fields;
/// missing numerics default to zero and missing totals are derived from items.
pub fn parse_to_nutrition(raw: &RawVisionResponse) -> CoreResult<Nutrition> {
    let payload = structured_payload(raw)?;

    let food_items: Vec<FoodItem> = match payload.get("foods").and_then(Value::as_array) {
        Some(foods) => foods.iter().map(food_item_of).collect::<CoreResult<_>>()?,
        None => vec![],
    };

    let confidence = payload
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);

    let macros = match payload.get("macros") {
        Some(m) if m.is_object() => Macros::new(
            num(m, "protein"),
            num(m, "carbs"),
            num(m, "fat"),
            m.get("fiber").and_then(Value::as_f64),
        )?,
        _ => food_items
            .iter()
            .fold(Macros::default(), |acc, i| acc.add(&i.macros)),
    };

    let calories = match payload.get("total_calories").and_then(Value::as_f64) {
        Some(c) => c.max(0.0),
        None if food_items.is_empty() => macros.total_calories(),
        None => food_items.iter().map(|i| i.calories).sum(),
    };

    Nutrition::new(calories, macros, None, food_items, confidence)
}

/// Dish name, if the model provided one. Never fails.
pub fn parse_dish_name(raw: &RawVisionResponse) -> Option<String> {
    structured_payload(raw)
        .ok()?
        .get("dish_name")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Audit copy of the response: prefer the original text, fall back to the
/// serialized structured payload.
pub fn extract_raw_json(raw: &RawVisionResponse) -> Option<String> {
    if let Some(text) = &raw.text {
        return Some(text.clone());
    }
    raw.structured.as_ref().map(|v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawVisionResponse {
        RawVisionResponse { structured: Some(value), text: None }
    }

    #[test]
    fn totals_derived_from_items_when_absent() {
        let response = raw(json!({
            "foods": [{
                "name": "Rice",
                "quantity": 150,
                "unit": "g",
                "calories": 195,
                "macros": {"protein": 4, "carbs": 42, "fat": 0.5}
            }],
            "confidence": 0.9
        }));
        let n = parse_to_nutrition(&response).unwrap();
        assert_eq!(n.calories, 195.0);
        assert_eq!(n.confidence_score, 0.9);
        assert_eq!(n.food_items.len(), 1);
        assert_eq!(n.macros.carbs_g, 42.0);
    }

    #[test]
    fn missing_name_is_a_parsing_error() {
        let response = raw(json!({"foods": [{"quantity": 100, "unit": "g"}]}));
        let err = parse_to_nutrition(&response).unwrap_err();
        assert!(matches!(err, CoreError::Parsing(_)));
    }

    #[test]
    fn missing_numerics_default_to_zero() {
        let response = raw(json!({"foods": [{"name": "Water", "quantity": 250, "unit": "ml"}]}));
        let n = parse_to_nutrition(&response).unwrap();
        assert_eq!(n.food_items[0].calories, 0.0);
        assert_eq!(n.food_items[0].macros.protein_g, 0.0);
    }

    #[test]
    fn missing_quantity_falls_back_to_one_serving() {
        let response = raw(json!({"foods": [{"name": "Soup", "calories": 80}]}));
        let n = parse_to_nutrition(&response).unwrap();
        assert_eq!(n.food_items[0].quantity, 1.0);
        assert_eq!(n.food_items[0].unit, "serving");
    }

    #[test]
    fn no_items_derives_calories_from_macros() {
        let response = raw(json!({
            "macros": {"protein": 10, "carbs": 20, "fat": 5},
            "confidence": 0.4
        }));
        let n = parse_to_nutrition(&response).unwrap();
        assert_eq!(n.calories, 10.0 * 4.0 + 20.0 * 4.0 + 5.0 * 9.0);
        assert!(n.food_items.is_empty());
    }

    #[test]
    fn confidence_clamped_to_unit_interval() {
        let response = raw(json!({"foods": [], "confidence": 3.2}));
        let n = parse_to_nutrition(&response).unwrap();
        assert_eq!(n.confidence_score, 1.0);
    }

    #[test]
    fn empty_payload_fails() {
        let response = RawVisionResponse { structured: None, text: Some("sorry, no idea".into()) };
        assert!(parse_to_nutrition(&response).is_err());
    }

    #[test]
    fn fenced_json_is_tolerated() {
        let text = "```json\n{\"dish_name\": \"Pasta\", \"foods\": [], \"confidence\": 0.7}\n```";
        let response = RawVisionResponse::from_text(text);
        assert_eq!(parse_dish_name(&response).as_deref(), Some("Pasta"));
        assert!(parse_to_nutrition(&response).is_ok());
    }

    #[test]
    fn dish_name_never_raises() {
        let response = RawVisionResponse { structured: None, text: None };
        assert_eq!(parse_dish_name(&response), None);
        let response = raw(json!({"foods": []}));
        assert_eq!(parse_dish_name(&response), None);
    }

    #[test]
    fn raw_json_prefers_original_text() {
        let response = RawVisionResponse {
            structured: Some(json!({"a": 1})),
            text: Some("original".into()),
        };
        assert_eq!(extract_raw_json(&response).as_deref(), Some("original"));
        let response = RawVisionResponse { structured: Some(json!({"a": 1})), text: None };
        assert_eq!(extract_raw_json(&response).as_deref(), Some("{\"a\":1}"));
    }
}
