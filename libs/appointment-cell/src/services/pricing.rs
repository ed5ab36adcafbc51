use tracing::debug;

use shared_config::ClinicSettings;

use crate::models::{AppointmentType, Payment, PaymentStatus};

/// Consultation fee schedule: one base fee, plus a platform surcharge for
/// video consultations.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingService {
    base_fee: f64,
    video_surcharge: f64,
    currency: String,
}

impl Default for PricingService {
    fn default() -> Self {
        Self::from_settings(&ClinicSettings::default())
    }
}

impl PricingService {
    pub fn new(base_fee: f64, video_surcharge: f64, currency: &str) -> Self {
        Self {
            base_fee,
            video_surcharge,
            currency: currency.to_string(),
        }
    }

    pub fn from_settings(settings: &ClinicSettings) -> Self {
        Self::new(settings.base_fee, settings.video_surcharge, &settings.currency)
    }

    pub fn base_fee(&self) -> f64 {
        self.base_fee
    }

    pub fn surcharge_for(&self, appointment_type: AppointmentType) -> f64 {
        match appointment_type {
            AppointmentType::Video => self.video_surcharge,
            AppointmentType::InPerson => 0.0,
        }
    }

    pub fn calculate_price(&self, appointment_type: AppointmentType) -> f64 {
        let price = self.base_fee + self.surcharge_for(appointment_type);
        debug!("Calculated price {:.2} {} for {} appointment", price, self.currency, appointment_type);
        price
    }

    /// Payment record for a new booking; always starts pending.
    pub fn quote(&self, appointment_type: AppointmentType) -> Payment {
        Payment {
            amount: self.calculate_price(appointment_type),
            currency: self.currency.clone(),
            status: PaymentStatus::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_includes_platform_surcharge() {
        let pricing = PricingService::default();
        assert_eq!(pricing.calculate_price(AppointmentType::Video), 155.0);
    }

    #[test]
    fn test_in_person_is_base_fee() {
        let pricing = PricingService::default();
        assert_eq!(pricing.calculate_price(AppointmentType::InPerson), 150.0);
    }

    #[test]
    fn test_quote_is_pending_in_configured_currency() {
        let pricing = PricingService::new(80.0, 2.5, "EUR");
        let payment = pricing.quote(AppointmentType::Video);

        assert_eq!(payment.amount, 82.5);
        assert_eq!(payment.currency, "EUR");
        assert_eq!(payment.status, PaymentStatus::Pending);
    }
}
