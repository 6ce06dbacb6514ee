use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::Service;

static ORDINAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("ordinal regex"));

/// Picks a service out of a free-form reply. Name match first (the
/// customer typed "barba" somewhere), then the first integer token read
/// as a 1-based position in the listing. No fuzzy matching.
pub fn resolve_service<'a>(text: &str, catalog: &'a [Service]) -> Option<&'a Service> {
    let lower = text.to_lowercase();

    if let Some(service) = catalog
        .iter()
        .find(|s| lower.contains(&s.name.to_lowercase()))
    {
        return Some(service);
    }

    let number: usize = ORDINAL.find(&lower)?.as_str().parse().ok()?;
    number.checked_sub(1).and_then(|idx| catalog.get(idx))
}
