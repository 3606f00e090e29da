//! Query filter builder: translates the flat key-value request query into a
//! structured filter/sort/projection/pagination descriptor for the tour
//! store.
//!
//! Comparison operators are recognized structurally, from keys of the form
//! `field[op]` (e.g. `price[gt]=100`). Values are never scanned or
//! rewritten, so a value that happens to contain `gt` or `lt` stays an
//! ordinary equality match. Column names only ever come from the allow-list
//! below; request values only ever travel as bind parameters.

use std::collections::HashMap;

use super::StoreError;

/// Reserved control keys, stripped before filter parsing.
const RESERVED_KEYS: [&str; 4] = ["page", "limit", "sort", "field"];

pub const DEFAULT_PAGE_SIZE: i64 = 100;
/// Upper bound on `limit`. Requests asking for more are clamped.
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    fn from_op(op: &str) -> Option<Self> {
        match op {
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            _ => None,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: &'static str,
    pub op: Comparison,
    pub value: FilterValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// A fully specified tour query, executed once against the store.
#[derive(Debug, Clone)]
pub struct TourQuery {
    pub filters: Vec<Filter>,
    pub sort: Vec<(&'static str, Direction)>,
    /// Response fields to retain; `None` means the full document.
    pub fields: Option<Vec<String>>,
    pub limit: i64,
    pub offset: i64,
}

/// Map an external (camelCase) field name to its filter/sort column.
/// Doubles as the allow-list: anything not here cannot reach the SQL text.
fn column_for(field: &str) -> Option<&'static str> {
    match field {
        "name" => Some("name"),
        "slug" => Some("slug"),
        "duration" => Some("duration"),
        "difficulty" => Some("difficulty"),
        "price" => Some("price"),
        "maxGroupSize" => Some("max_group_size"),
        "ratingsAverage" => Some("ratings_average"),
        "ratingsQuantity" => Some("ratings_quantity"),
        "createdAt" => Some("created_at"),
        "updatedAt" => Some("updated_at"),
        _ => None,
    }
}

fn is_numeric_column(column: &str) -> bool {
    matches!(
        column,
        "duration" | "price" | "max_group_size" | "ratings_average" | "ratings_quantity"
    )
}

/// External field names that may appear in a projection list.
const PROJECTABLE: [&str; 19] = [
    "id",
    "name",
    "slug",
    "duration",
    "difficulty",
    "price",
    "maxGroupSize",
    "summary",
    "description",
    "imageCover",
    "ratingsAverage",
    "ratingsQuantity",
    "images",
    "startDates",
    "startLocation",
    "locations",
    "guides",
    "createdAt",
    "updatedAt",
];

fn cast_error(field: &str, value: &str) -> StoreError {
    StoreError::Cast {
        field: field.to_string(),
        value: value.to_string(),
    }
}

/// Parse the raw request query into a `TourQuery`.
pub fn parse(params: &HashMap<String, String>) -> Result<TourQuery, StoreError> {
    let filters = parse_filters(params)?;
    let sort = parse_sort(params.get("sort").map(String::as_str))?;
    let fields = parse_fields(params.get("field").map(String::as_str))?;
    let (limit, offset) = parse_pagination(
        params.get("page").map(String::as_str),
        params.get("limit").map(String::as_str),
    )?;

    Ok(TourQuery {
        filters,
        sort,
        fields,
        limit,
        offset,
    })
}

fn parse_filters(params: &HashMap<String, String>) -> Result<Vec<Filter>, StoreError> {
    let mut filters = Vec::new();

    // Deterministic order keeps the rendered SQL stable
    let mut keys: Vec<&String> = params
        .keys()
        .filter(|k| !RESERVED_KEYS.contains(&k.as_str()))
        .collect();
    keys.sort();

    for key in keys {
        let value = &params[key];

        // `price[gt]` → field "price", op "gt"; a bare key is an equality
        let (field, op) = match key.find('[') {
            Some(open) if key.ends_with(']') => {
                let op_name = &key[open + 1..key.len() - 1];
                let op = Comparison::from_op(op_name)
                    .ok_or_else(|| cast_error("operator", op_name))?;
                (&key[..open], op)
            }
            _ => (key.as_str(), Comparison::Eq),
        };

        let column = column_for(field).ok_or_else(|| cast_error("query parameter", field))?;

        let value = if is_numeric_column(column) {
            let number: f64 = value
                .parse()
                .map_err(|_| cast_error(field, value))?;
            FilterValue::Number(number)
        } else {
            FilterValue::Text(value.clone())
        };

        filters.push(Filter {
            column,
            op,
            value,
        });
    }

    Ok(filters)
}

fn parse_sort(sort: Option<&str>) -> Result<Vec<(&'static str, Direction)>, StoreError> {
    let Some(sort) = sort else {
        // Most recently created first
        return Ok(vec![("created_at", Direction::Desc)]);
    };

    let mut order = Vec::new();
    for part in sort.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (field, direction) = match part.strip_prefix('-') {
            Some(rest) => (rest, Direction::Desc),
            None => (part, Direction::Asc),
        };
        let column = column_for(field).ok_or_else(|| cast_error("sort field", field))?;
        order.push((column, direction));
    }

    if order.is_empty() {
        order.push(("created_at", Direction::Desc));
    }
    Ok(order)
}

fn parse_fields(fields: Option<&str>) -> Result<Option<Vec<String>>, StoreError> {
    let Some(fields) = fields else {
        return Ok(None);
    };

    let mut selected = Vec::new();
    for part in fields.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if !PROJECTABLE.contains(&part) {
            return Err(cast_error("field", part));
        }
        selected.push(part.to_string());
    }

    if selected.is_empty() {
        return Ok(None);
    }
    // The identifier always survives projection
    if !selected.iter().any(|f| f == "id") {
        selected.push("id".to_string());
    }
    Ok(Some(selected))
}

fn parse_pagination(
    page: Option<&str>,
    limit: Option<&str>,
) -> Result<(i64, i64), StoreError> {
    let page: i64 = match page {
        Some(raw) => raw.parse().map_err(|_| cast_error("page", raw))?,
        None => 1,
    };
    let limit: i64 = match limit {
        Some(raw) => raw.parse().map_err(|_| cast_error("limit", raw))?,
        None => DEFAULT_PAGE_SIZE,
    };

    let page = page.max(1);
    let limit = limit.clamp(1, MAX_PAGE_SIZE);
    Ok((limit, (page - 1) * limit))
}

/// Keep only the requested fields of a serialized document.
pub fn apply_projection(
    document: serde_json::Value,
    fields: &[String],
) -> serde_json::Value {
    match document {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .filter(|(key, _)| fields.iter().any(|f| f == key))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_when_empty() {
        let q = parse(&params(&[])).unwrap();
        assert!(q.filters.is_empty());
        assert_eq!(q.sort, vec![("created_at", Direction::Desc)]);
        assert!(q.fields.is_none());
        assert_eq!(q.limit, 100);
        assert_eq!(q.offset, 0);
    }

    #[test]
    fn comparison_key_parses_structurally() {
        let q = parse(&params(&[("price[gt]", "100")])).unwrap();
        assert_eq!(
            q.filters,
            vec![Filter {
                column: "price",
                op: Comparison::Gt,
                value: FilterValue::Number(100.0),
            }]
        );
    }

    #[test]
    fn bare_key_is_equality() {
        let q = parse(&params(&[("duration", "5")])).unwrap();
        assert_eq!(q.filters[0].op, Comparison::Eq);
        assert_eq!(q.filters[0].value, FilterValue::Number(5.0));
    }

    #[test]
    fn operator_words_in_values_are_not_rewritten() {
        // "gt" appears inside the value; it must stay an equality bind
        let q = parse(&params(&[("name", "The Great gt Lakes")])).unwrap();
        assert_eq!(q.filters[0].op, Comparison::Eq);
        assert_eq!(
            q.filters[0].value,
            FilterValue::Text("The Great gt Lakes".to_string())
        );
    }

    #[test]
    fn unknown_filter_field_is_rejected() {
        assert!(parse(&params(&[("evil); DROP TABLE tours", "1")])).is_err());
        assert!(parse(&params(&[("summary", "x")])).is_err());
    }

    #[test]
    fn unknown_operator_is_rejected() {
        assert!(parse(&params(&[("price[regex]", "1")])).is_err());
    }

    #[test]
    fn non_numeric_value_for_numeric_column_is_a_cast_error() {
        let err = parse(&params(&[("price", "cheap")])).unwrap_err();
        assert!(matches!(err, StoreError::Cast { .. }));
    }

    #[test]
    fn sort_list_with_descending_prefix() {
        let q = parse(&params(&[("sort", "price,-ratingsAverage")])).unwrap();
        assert_eq!(
            q.sort,
            vec![
                ("price", Direction::Asc),
                ("ratings_average", Direction::Desc)
            ]
        );
    }

    #[test]
    fn unknown_sort_field_is_rejected() {
        assert!(parse(&params(&[("sort", "password_hash")])).is_err());
    }

    #[test]
    fn projection_keeps_id() {
        let q = parse(&params(&[("field", "name,price")])).unwrap();
        let fields = q.fields.unwrap();
        assert!(fields.contains(&"id".to_string()));

        let doc = serde_json::json!({
            "id": "t1", "name": "A", "price": 9.0, "summary": "hidden"
        });
        let projected = apply_projection(doc, &fields);
        let obj = projected.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert!(!obj.contains_key("summary"));
    }

    #[test]
    fn pagination_math_and_cap() {
        let q = parse(&params(&[("page", "2"), ("limit", "2")])).unwrap();
        assert_eq!((q.limit, q.offset), (2, 2));

        let q = parse(&params(&[("limit", "5000")])).unwrap();
        assert_eq!(q.limit, MAX_PAGE_SIZE);

        let q = parse(&params(&[("page", "0")])).unwrap();
        assert_eq!(q.offset, 0);
    }

    #[test]
    fn malformed_page_is_a_cast_error() {
        assert!(parse(&params(&[("page", "two")])).is_err());
    }
}
