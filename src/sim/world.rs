use super::domain::PowerDomain;
use crate::error::PowerError;
use crate::infra::Infrastructure;

/// Mutable state shared by every task: the topology and the power domains.
#[derive(Debug, Default)]
pub struct World {
    pub infrastructure: Infrastructure,
    pub domains: Vec<PowerDomain>,
}

impl World {
    pub fn new(infrastructure: Infrastructure) -> Self {
        Self {
            infrastructure,
            domains: Vec::new(),
        }
    }

    pub fn domain(&self, name: &str) -> Option<&PowerDomain> {
        self.domains.iter().find(|d| d.name == name)
    }

    /// A domain together with the infrastructure it powers, both mutable.
    ///
    /// # Errors
    ///
    /// Returns `PowerError::UnknownDomain` if no domain has that name.
    pub fn domain_mut(
        &mut self,
        name: &str,
    ) -> Result<(&mut PowerDomain, &mut Infrastructure), PowerError> {
        let domain = self
            .domains
            .iter_mut()
            .find(|d| d.name == name)
            .ok_or_else(|| PowerError::UnknownDomain(name.to_string()))?;
        Ok((domain, &mut self.infrastructure))
    }
}
