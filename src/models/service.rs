use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub name: String,
    pub price: f64,
    pub duration_minutes: i32,
}

impl Service {
    pub fn new(name: &str, price: f64, duration_minutes: i32) -> Self {
        Self {
            name: name.to_string(),
            price,
            duration_minutes,
        }
    }
}

/// Built-in catalog used whenever the services table is empty or unreadable.
pub fn default_catalog() -> Vec<Service> {
    vec![
        Service::new("Corte de Cabello", 15.0, 30),
        Service::new("Barba", 10.0, 20),
        Service::new("Corte + Barba", 22.0, 50),
    ]
}
