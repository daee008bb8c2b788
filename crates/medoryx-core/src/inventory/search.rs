//! Proximity-aware medicine search and name suggestions.

use std::cmp::Ordering;
use std::collections::HashMap;

use strsim::{jaro_winkler, normalized_levenshtein};
use tracing::debug;

use super::Inventory;
use crate::db::{AccountCriteria, MedicineCriteria};
use crate::error::CoreResult;
use crate::geo::BoundingBox;
use crate::models::{MedicineMatch, Role, SearchFilter};

impl<'a> Inventory<'a> {
    /// In-stock medicines matching the filter.
    ///
    /// With a caller position, only pharmacies within the radius count and
    /// results are ordered by distance, then medicine id. Without one,
    /// results come in insertion order.
    pub fn search(&self, filter: &SearchFilter) -> CoreResult<Vec<MedicineMatch>> {
        let query = filter.normalized_query();
        let limit = self.search.result_limit;

        let Some(origin) = filter.near else {
            let pharmacy_ids = self.pharmacies_in_place(filter)?;
            let rows = self.db.search_medicines(&MedicineCriteria {
                name_contains: query,
                pharmacy_ids: pharmacy_ids.as_deref(),
                in_stock_only: true,
                limit: Some(limit),
            })?;
            debug!(query, count = rows.len(), "medicine search");
            return Ok(rows
                .into_iter()
                .map(|(medicine, pharmacy_name)| MedicineMatch {
                    medicine,
                    pharmacy_name,
                    distance_meters: None,
                })
                .collect());
        };

        let radius = filter.radius_or(self.search.default_radius_meters)?;
        let candidates = self.db.find_accounts(&AccountCriteria {
            role: Some(Role::Pharmacy),
            city: filter.normalized_city(),
            area: filter.normalized_area(),
            within: Some(BoundingBox::around(&origin, radius)),
            ..Default::default()
        })?;

        // The box over-approximates the circle; exact distance decides
        let distances: HashMap<String, f64> = candidates
            .into_iter()
            .filter_map(|pharmacy| {
                let distance = pharmacy.location?.distance_to(&origin);
                (distance <= radius).then_some((pharmacy.id, distance))
            })
            .collect();
        let pharmacy_ids: Vec<String> = distances.keys().cloned().collect();

        let rows = self.db.search_medicines(&MedicineCriteria {
            name_contains: query,
            pharmacy_ids: Some(pharmacy_ids.as_slice()),
            in_stock_only: true,
            limit: None,
        })?;

        let mut matches: Vec<MedicineMatch> = rows
            .into_iter()
            .map(|(medicine, pharmacy_name)| {
                let distance = distances.get(&medicine.pharmacy_id).copied();
                MedicineMatch {
                    medicine,
                    pharmacy_name,
                    distance_meters: distance,
                }
            })
            .collect();
        matches.sort_by(|a, b| {
            let da = a.distance_meters.unwrap_or(f64::INFINITY);
            let db = b.distance_meters.unwrap_or(f64::INFINITY);
            da.partial_cmp(&db)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.medicine.id.cmp(&b.medicine.id))
        });
        matches.truncate(limit);

        debug!(
            query,
            radius,
            pharmacies = pharmacy_ids.len(),
            count = matches.len(),
            "medicine proximity search"
        );
        Ok(matches)
    }

    /// Pharmacies matching the city/area filter; `None` when neither is set.
    fn pharmacies_in_place(&self, filter: &SearchFilter) -> CoreResult<Option<Vec<String>>> {
        let (city, area) = (filter.normalized_city(), filter.normalized_area());
        if city.is_none() && area.is_none() {
            return Ok(None);
        }
        let pharmacies = self.db.find_accounts(&AccountCriteria {
            role: Some(Role::Pharmacy),
            city,
            area,
            ..Default::default()
        })?;
        Ok(Some(pharmacies.into_iter().map(|p| p.id).collect()))
    }

    /// Distinct medicine names starting with `prefix`, closest first.
    ///
    /// Prefixes shorter than the configured minimum return nothing without
    /// touching storage.
    pub fn suggest(&self, prefix: &str) -> CoreResult<Vec<String>> {
        let prefix = prefix.trim();
        if prefix.chars().count() < self.search.min_suggestion_prefix {
            return Ok(Vec::new());
        }

        let names = self
            .db
            .suggest_medicine_names(prefix, self.search.suggestion_scan_limit)?;
        let needle = prefix.to_lowercase();
        let mut scored: Vec<(f64, String)> = names
            .into_iter()
            .map(|name| (similarity(&needle, &name.to_lowercase()), name))
            .collect();
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.1.to_lowercase().cmp(&b.1.to_lowercase()))
        });

        let suggestions: Vec<String> = scored
            .into_iter()
            .take(self.search.suggestion_limit)
            .map(|(_, name)| name)
            .collect();
        debug!(prefix, count = suggestions.len(), "medicine suggestions");
        Ok(suggestions)
    }
}

/// Jaro-Winkler weighted for prefixes, blended with Levenshtein.
fn similarity(a: &str, b: &str) -> f64 {
    jaro_winkler(a, b) * 0.6 + normalized_levenshtein(a, b) * 0.4
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AlertConfig, SearchConfig};
    use crate::db::Database;
    use crate::geo::GeoPoint;
    use crate::models::{Account, Medicine};
    use chrono::NaiveDate;

    fn origin() -> GeoPoint {
        GeoPoint::new(77.5946, 12.9716).unwrap()
    }

    fn pharmacy(db: &Database, id: &str, location: Option<GeoPoint>, city: &str) {
        let mut account = Account::new(id.into(), Role::Pharmacy, format!("Pharmacy {}", id));
        account.location = location;
        account.city = Some(city.into());
        db.upsert_account(&account).unwrap();
    }

    fn stock(db: &Database, pharmacy_id: &str, name: &str, stock: u32) -> Medicine {
        let medicine = Medicine::new(
            pharmacy_id.into(),
            name.into(),
            25.0,
            stock,
            NaiveDate::from_ymd_opt(2027, 1, 1).unwrap(),
        );
        db.insert_medicine(&medicine).unwrap();
        medicine
    }

    #[test]
    fn test_text_search_skips_out_of_stock() {
        let db = Database::open_in_memory().unwrap();
        let (search, alerts) = (SearchConfig::default(), AlertConfig::default());
        pharmacy(&db, "ph-1", None, "Bengaluru");
        let inventory = Inventory::new(&db, &search, &alerts);

        let in_stock = stock(&db, "ph-1", "Paracetamol 500", 4);
        stock(&db, "ph-1", "Paracetamol 650", 0);
        stock(&db, "ph-1", "Ibuprofen", 9);

        let results = inventory.search(&SearchFilter::text("PARA")).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].medicine.id, in_stock.id);
        assert_eq!(results[0].pharmacy_name, "Pharmacy ph-1");
        assert_eq!(results[0].distance_meters, None);
    }

    #[test]
    fn test_empty_query_returns_everything_in_insertion_order() {
        let db = Database::open_in_memory().unwrap();
        let (search, alerts) = (SearchConfig::default(), AlertConfig::default());
        pharmacy(&db, "ph-1", None, "Bengaluru");
        let inventory = Inventory::new(&db, &search, &alerts);

        let first = stock(&db, "ph-1", "Zinc", 1);
        let second = stock(&db, "ph-1", "Aspirin", 1);

        let results = inventory.search(&SearchFilter::default()).unwrap();
        let ids: Vec<_> = results.iter().map(|m| m.medicine.id.as_str()).collect();
        assert_eq!(ids, vec![first.id.as_str(), second.id.as_str()]);
    }

    #[test]
    fn test_city_filter() {
        let db = Database::open_in_memory().unwrap();
        let (search, alerts) = (SearchConfig::default(), AlertConfig::default());
        pharmacy(&db, "ph-1", None, "Bengaluru");
        pharmacy(&db, "ph-2", None, "Mysuru");
        let inventory = Inventory::new(&db, &search, &alerts);

        stock(&db, "ph-1", "Paracetamol", 3);
        let wanted = stock(&db, "ph-2", "Paracetamol", 3);

        let filter = SearchFilter {
            query: Some("paracetamol".into()),
            city: Some("mysuru".into()),
            ..Default::default()
        };
        let results = inventory.search(&filter).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].medicine.id, wanted.id);
    }

    #[test]
    fn test_equal_distance_ties_break_by_id() {
        let db = Database::open_in_memory().unwrap();
        let (search, alerts) = (SearchConfig::default(), AlertConfig::default());
        pharmacy(&db, "ph-1", Some(origin().offset_north(2_000.0)), "Bengaluru");
        let inventory = Inventory::new(&db, &search, &alerts);

        let a = stock(&db, "ph-1", "Paracetamol", 3);
        let b = stock(&db, "ph-1", "Paracetamol Kids", 3);

        let results = inventory
            .search(&SearchFilter::near("paracetamol", origin()))
            .unwrap();
        let mut expected = vec![a.id.clone(), b.id.clone()];
        expected.sort();
        let ids: Vec<_> = results.iter().map(|m| m.medicine.id.clone()).collect();
        assert_eq!(ids, expected);
        assert!(results.iter().all(|m| m.distance_meters.is_some()));
    }

    #[test]
    fn test_short_prefix_returns_nothing() {
        let db = Database::open_in_memory().unwrap();
        let (search, alerts) = (SearchConfig::default(), AlertConfig::default());
        pharmacy(&db, "ph-1", None, "Bengaluru");
        stock(&db, "ph-1", "Paracetamol", 3);
        let inventory = Inventory::new(&db, &search, &alerts);

        assert!(inventory.suggest("P").unwrap().is_empty());
        assert!(inventory.suggest("  p ").unwrap().is_empty());
        assert_eq!(inventory.suggest("pa").unwrap(), vec!["Paracetamol".to_string()]);
    }

    #[test]
    fn test_suggestions_are_distinct_and_capped() {
        let db = Database::open_in_memory().unwrap();
        let (search, alerts) = (SearchConfig::default(), AlertConfig::default());
        pharmacy(&db, "ph-1", None, "Bengaluru");
        pharmacy(&db, "ph-2", None, "Bengaluru");
        for i in 0..12 {
            stock(&db, "ph-1", &format!("Pantoprazole {}", i), 1);
        }
        stock(&db, "ph-1", "Pan", 1);
        stock(&db, "ph-2", "Pan", 1);
        let inventory = Inventory::new(&db, &search, &alerts);

        let suggestions = inventory.suggest("pan").unwrap();
        assert_eq!(suggestions.len(), 10);
        assert_eq!(suggestions[0], "Pan");
        assert_eq!(suggestions.iter().filter(|s| s.as_str() == "Pan").count(), 1);
    }
}
