use std::{collections::HashMap, sync::Arc};

use super::adapter::PaymentProviderAdapter;
use crate::domain::value_objects::enums::payment_providers::PaymentProvider;

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<PaymentProvider, Arc<dyn PaymentProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, adapter: Arc<dyn PaymentProviderAdapter>) -> Self {
        self.adapters.insert(adapter.provider(), adapter);
        self
    }

    pub fn get(&self, provider: PaymentProvider) -> Option<Arc<dyn PaymentProviderAdapter>> {
        self.adapters.get(&provider).cloned()
    }

    pub fn providers(&self) -> Vec<PaymentProvider> {
        PaymentProvider::ALL
            .into_iter()
            .filter(|provider| self.adapters.contains_key(provider))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::{adapter::MockPaymentProviderAdapter, payping::PayPingAdapter};

    #[test]
    fn lookup_only_returns_registered_providers() {
        let mut zarinpal = MockPaymentProviderAdapter::new();
        zarinpal
            .expect_provider()
            .return_const(PaymentProvider::Zarinpal);

        let registry = ProviderRegistry::new()
            .register(Arc::new(zarinpal))
            .register(Arc::new(PayPingAdapter::new(
                "token".to_string(),
                "secret".to_string(),
                None,
            )));

        assert!(registry.get(PaymentProvider::Zarinpal).is_some());
        assert!(registry.get(PaymentProvider::IdPay).is_none());
        assert_eq!(
            registry.providers(),
            vec![PaymentProvider::Zarinpal, PaymentProvider::PayPing]
        );
    }
}
