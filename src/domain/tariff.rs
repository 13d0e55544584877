// Tariff parameters and billing result models
//
// Models the Belgian residential electricity bill: dynamic energy components
// priced against the EPEX day-ahead market, flat per-kWh levies, fixed
// subscription fees and the Fluvius capacity tariff charged on peak demand.
use serde::{Deserialize, Serialize};

/// Supplier and grid-operator rates, loaded from configuration.
///
/// The dynamic components are linear in the day-ahead price:
/// `cost/kWh = coefficient * price(EUR/MWh) + fixed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct TariffParameters {
    /// Fixed subscription fees, each in EUR per month.
    pub fixed_monthly_fees: Vec<f64>,
    pub consumption_coefficient: f64,
    pub consumption_fixed: f64,
    pub injection_coefficient: f64,
    pub injection_fixed: f64,
    /// Grid distribution charge, EUR per kWh delivered.
    pub distribution_rate: f64,
    /// Prosumer injection charge, EUR per kWh returned.
    pub injection_rate: f64,
    /// Green certificate levy, EUR per kWh delivered.
    pub green_cert_rate: f64,
    /// Combined heat and power levy, EUR per kWh delivered.
    pub chp_rate: f64,
    /// Fluvius capacity tariff, EUR per kW of average monthly peak per year.
    pub capacity_rate_eur_per_kw_year: f64,
}

impl TariffParameters {
    /// Consumer energy price in EUR/kWh at a given market price in EUR/MWh.
    pub fn consumption_cost_per_kwh(&self, price_eur_per_mwh: f64) -> f64 {
        self.consumption_coefficient * price_eur_per_mwh + self.consumption_fixed
    }

    /// Injection compensation in EUR/kWh at a given market price in EUR/MWh.
    pub fn injection_revenue_per_kwh(&self, price_eur_per_mwh: f64) -> f64 {
        self.injection_coefficient * price_eur_per_mwh + self.injection_fixed
    }

    pub fn fixed_monthly_total(&self) -> f64 {
        self.fixed_monthly_fees.iter().sum()
    }

    /// One month of capacity tariff for a peak demand in kW.
    pub fn capacity_cost_per_month(&self, peak_kw: f64) -> f64 {
        peak_kw * self.capacity_rate_eur_per_kw_year / 12.0
    }
}

/// Itemized electricity costs over one period.
///
/// `total_cost` sums the cost components only; injection revenue is reported
/// separately and subtracted once in `net_cost`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBreakdown {
    pub fixed_cost: f64,
    pub energy_cost: f64,
    pub energy_revenue: f64,
    pub distribution_cost: f64,
    pub injection_cost: f64,
    pub green_cert_cost: f64,
    pub chp_cost: f64,
    pub capacity_cost: f64,
    pub total_cost: f64,
    pub net_cost: f64,
    pub total_kwh_delivered: f64,
    pub total_kwh_returned: f64,
    pub peak_power_kw: f64,
}

impl CostBreakdown {
    /// Derive `total_cost` and `net_cost` from the component fields.
    pub fn with_totals(mut self) -> Self {
        self.total_cost = self.fixed_cost
            + self.energy_cost
            + self.distribution_cost
            + self.injection_cost
            + self.green_cert_cost
            + self.chp_cost
            + self.capacity_cost;
        self.net_cost = self.total_cost - self.energy_revenue;
        self
    }
}

/// Fluvius capacity tariff over a lookback of monthly peaks.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapacityTariff {
    /// Highest 15-minute average power per calendar month, in watts.
    pub monthly_peaks: Vec<f64>,
    pub average_peak: f64,
    pub monthly_cost: f64,
    pub yearly_cost: f64,
    /// Rate the costs were computed with, EUR per kW per year.
    pub tariff_rate: f64,
}

impl CapacityTariff {
    pub fn from_monthly_peaks(monthly_peaks: Vec<f64>, rate_eur_per_kw_year: f64) -> Self {
        if monthly_peaks.is_empty() {
            return Self {
                monthly_peaks,
                average_peak: 0.0,
                monthly_cost: 0.0,
                yearly_cost: 0.0,
                tariff_rate: rate_eur_per_kw_year,
            };
        }
        let average_peak = monthly_peaks.iter().sum::<f64>() / monthly_peaks.len() as f64;
        let monthly_cost = (average_peak / 1000.0) * rate_eur_per_kw_year / 12.0;
        Self {
            monthly_peaks,
            average_peak,
            monthly_cost,
            yearly_cost: monthly_cost * 12.0,
            tariff_rate: rate_eur_per_kw_year,
        }
    }
}
