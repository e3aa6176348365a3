//! Display units for shopping-list quantities.
//!
//! Formatting is applied once, to raw quantities, and never writes back into
//! a plan.

use crate::catalog::{self, Category, Unit};
use crate::models::{Bucket, Quantity, format_number};

fn with_unit(quantity: &Quantity, unit: &str) -> String {
    format!("{quantity} {unit}")
}

/// Shopping-list display string for one ingredient.
pub fn format_quantity(category: Category, name: &str, quantity: &Quantity) -> String {
    if catalog::is_gram_measured(name) {
        return with_unit(quantity, Unit::Grams.suffix());
    }
    match category {
        Category::Fresh if catalog::is_onion(name) => with_unit(quantity, Unit::Bulbs.suffix()),
        Category::Tinned => match quantity.as_f64() {
            Some(v) if v <= 1.0 => format!("{} tin", format_number(v)),
            Some(v) => format!("{} tins", format_number(v)),
            None => quantity.to_string(),
        },
        Category::Dairy if name == "Milk" => with_unit(quantity, Unit::Millilitres.suffix()),
        _ => quantity.to_string(),
    }
}

/// Format parallel name/value lists. The output is as long as the shorter input.
pub fn format_category<S: AsRef<str>>(
    category: Category,
    names: &[S],
    values: &[Quantity],
) -> Vec<String> {
    names
        .iter()
        .zip(values)
        .map(|(name, value)| format_quantity(category, name.as_ref(), value))
        .collect()
}

/// `(name, display)` pairs for a whole bucket, in name order.
pub fn format_bucket(category: Category, bucket: &Bucket) -> Vec<(String, String)> {
    let names: Vec<&str> = bucket.keys().map(String::as_str).collect();
    let values: Vec<Quantity> = bucket.values().cloned().collect();
    let display = format_category(category, &names, &values);
    bucket.keys().cloned().zip(display).collect()
}

/// Detail-page formatting: use whatever unit the catalog lists for the
/// ingredient, in any category. Unknown ingredients show the bare value.
pub fn format_with_catalog_unit(name: &str, quantity: &Quantity) -> String {
    let Some(unit) = catalog::unit_for(name) else {
        return quantity.to_string();
    };
    match (unit, quantity.as_f64()) {
        (Unit::Tins, Some(v)) if v == 1.0 => "1 tin".to_string(),
        (_, Some(v)) => format!("{} {}", format_number(v), unit.suffix()),
        (_, None) => with_unit(quantity, unit.suffix()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(v: f64) -> Quantity {
        Quantity::Number(v)
    }

    #[test]
    fn test_fresh_units() {
        assert_eq!(format_quantity(Category::Fresh, "Tomatoes", &num(250.0)), "250 g");
        assert_eq!(format_quantity(Category::Fresh, "Onions (Red)", &num(2.0)), "2 bulbs");
        assert_eq!(format_quantity(Category::Fresh, "Garlic", &num(4.0)), "4");
        assert_eq!(format_quantity(Category::Fresh, "Okra", &num(3.5)), "3.5");
    }

    #[test]
    fn test_tinned_singular_and_plural() {
        assert_eq!(format_quantity(Category::Tinned, "Chickpeas", &num(1.0)), "1 tin");
        assert_eq!(format_quantity(Category::Tinned, "Chickpeas", &num(2.0)), "2 tins");
        assert_eq!(format_quantity(Category::Tinned, "Coconut Milk", &num(0.5)), "0.5 tin");
        assert_eq!(format_quantity(Category::Tinned, "Kidney Beans", &num(1.5)), "1.5 tins");
        assert_eq!(
            format_quantity(Category::Tinned, "Chickpeas", &Quantity::from("2")),
            "2 tins"
        );
        assert_eq!(
            format_quantity(Category::Tinned, "Chickpeas", &Quantity::from("one")),
            "one"
        );
    }

    #[test]
    fn test_gram_set_wins_in_any_category() {
        assert_eq!(format_quantity(Category::Tinned, "Tomatoes", &num(400.0)), "400 g");
        assert_eq!(format_quantity(Category::Dry, "Toor Dal", &num(150.0)), "150 g");
        assert_eq!(format_quantity(Category::Dairy, "Paneer", &num(200.0)), "200 g");
    }

    #[test]
    fn test_dry_and_dairy_fall_back_to_bare_value() {
        assert_eq!(format_quantity(Category::Dry, "Turmeric", &num(1.5)), "1.5");
        assert_eq!(format_quantity(Category::Dairy, "Milk", &num(500.0)), "500 ml");
        assert_eq!(format_quantity(Category::Dairy, "Yogurt", &num(150.0)), "150");
    }

    #[test]
    fn test_text_values_keep_raw_form_with_unit() {
        assert_eq!(
            format_quantity(Category::Fresh, "Spinach", &Quantity::from("a bunch")),
            "a bunch g"
        );
        assert_eq!(
            format_quantity(Category::Dry, "Cumin Seeds", &Quantity::from("a pinch")),
            "a pinch"
        );
    }

    #[test]
    fn test_format_category_is_parallel() {
        let names = ["Chickpeas", "Tomato Puree"];
        let values = [num(2.0), num(3.0)];
        let out = format_category(Category::Tinned, &names, &values);
        assert_eq!(out, vec!["2 tins", "3 tins"]);

        let short = format_category(Category::Tinned, &names, &values[..1]);
        assert_eq!(short.len(), 1);
    }

    #[test]
    fn test_format_bucket_pairs_names_with_display() {
        let mut bucket = Bucket::new();
        bucket.insert("Tomatoes".to_string(), num(250.0));
        bucket.insert("Onions (White)".to_string(), num(1.0));
        let pairs = format_bucket(Category::Fresh, &bucket);
        assert_eq!(
            pairs,
            vec![
                ("Onions (White)".to_string(), "1 bulbs".to_string()),
                ("Tomatoes".to_string(), "250 g".to_string()),
            ]
        );
        // The bucket itself is untouched.
        assert_eq!(bucket["Tomatoes"], num(250.0));
    }

    #[test]
    fn test_catalog_unit_formatting() {
        assert_eq!(format_with_catalog_unit("Garlic", &num(3.0)), "3 cloves");
        assert_eq!(format_with_catalog_unit("Chickpeas", &num(1.0)), "1 tin");
        assert_eq!(format_with_catalog_unit("Chickpeas", &num(0.5)), "0.5 tins");
        assert_eq!(format_with_catalog_unit("Turmeric", &Quantity::from("1")), "1 tsp");
        assert_eq!(format_with_catalog_unit("Lemon", &Quantity::from("half")), "half pcs");
        assert_eq!(format_with_catalog_unit("Okra", &num(200.0)), "200");
    }
}
