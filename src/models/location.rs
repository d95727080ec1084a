use serde::{Deserialize, Serialize};

use super::expenses::Expense;

#[derive(Clone, Debug, Deserialize)]
pub struct PlacesResponse {
    #[serde(default)]
    pub places: Vec<Place>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub formatted_address: Option<String>,
    #[serde(default)]
    pub location: Option<LatLng>,
    #[serde(default)]
    pub display_name: Option<LocalizedText>,
    #[serde(default)]
    pub types: Vec<String>,
    #[serde(default)]
    pub address_components: Vec<AddressComponent>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
pub struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LocalizedText {
    pub text: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressComponent {
    #[serde(default)]
    pub long_text: String,
    #[serde(default)]
    pub short_text: String,
    #[serde(default)]
    pub types: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LocationInfo {
    pub location: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
}

impl LocationInfo {
    pub fn from_place(place: &Place) -> Option<Self> {
        let coordinates = place.location?;

        let mut city = String::new();
        let mut country = String::new();
        let mut street_number = String::new();
        let mut route = String::new();

        for component in &place.address_components {
            let has = |t: &str| component.types.iter().any(|x| x == t);
            if has("locality") || has("administrative_area_level_2") {
                city = component.long_text.clone();
            }
            if has("country") {
                country = component.long_text.clone();
            }
            if has("street_number") {
                street_number = component.long_text.clone();
            }
            if has("route") {
                route = component.long_text.clone();
            }
        }

        let address = match (route.is_empty(), street_number.is_empty()) {
            (false, false) => Some(format!("{} {}", route, street_number)),
            (false, true) => Some(route),
            _ => place.formatted_address.clone(),
        };

        let location = [city.as_str(), country.as_str()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(", ");
        let location = if !location.is_empty() {
            Some(location)
        } else {
            place
                .formatted_address
                .clone()
                .or_else(|| place.display_name.as_ref().map(|d| d.text.clone()))
        };

        Some(Self {
            location,
            address,
            city: (!city.is_empty()).then_some(city),
            country: (!country.is_empty()).then_some(country),
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
        })
    }

    pub fn apply_to(&self, expense: &Expense) -> Expense {
        let mut enriched = expense.clone();
        enriched.location = self.location.clone().or_else(|| expense.location.clone());
        enriched.address = self.address.clone().or_else(|| expense.address.clone());
        enriched.city = self.city.clone().or_else(|| expense.city.clone());
        enriched.country = self.country.clone().or_else(|| expense.country.clone());
        enriched.latitude = Some(self.latitude);
        enriched.longitude = Some(self.longitude);
        enriched
    }
}
