use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedtestResult {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    pub timestamp: String,
    pub download_speed: f64,
    pub upload_speed: f64,
    pub ping: f64,
    #[serde(default)]
    pub server: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedtestAverage {
    pub download_speed: f64,
    pub upload_speed: f64,
    pub ping: f64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeedtestSummary {
    #[serde(default)]
    pub latest: Option<SpeedtestResult>,
    #[serde(default)]
    pub average: Option<SpeedtestAverage>,
    #[serde(default)]
    pub total_tests: Option<u64>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub total: Option<u64>,
    pub total_pages: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SpeedtestHistory {
    #[serde(default)]
    pub results: Vec<SpeedtestResult>,
    pub pagination: Pagination,
}

pub fn format_speed(mbps: f64) -> String {
    if mbps >= 1000.0 {
        format!("{:.2} Gbps", mbps / 1000.0)
    } else {
        format!("{:.1} Mbps", mbps)
    }
}
