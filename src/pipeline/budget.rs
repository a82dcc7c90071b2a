use crate::errors::PipelineError;

/// Failed attempts allowed per task, across all stages.
///
/// A task survives `budget` failures; failure number `budget + 1` exhausts
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorBudget {
    budget: u32,
    errors: u32,
}

impl ErrorBudget {
    pub fn new(budget: u32) -> Self {
        Self { budget, errors: 0 }
    }

    pub fn errors(&self) -> u32 {
        self.errors
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Count one failed attempt.
    pub fn record(&mut self) -> Result<u32, PipelineError> {
        self.errors += 1;
        if self.errors > self.budget {
            return Err(PipelineError::BudgetExhausted {
                errors: self.errors,
                budget: self.budget,
            });
        }
        Ok(self.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_allows_exactly_budget_failures() {
        let mut budget = ErrorBudget::new(3);
        assert_eq!(budget.record().unwrap(), 1);
        assert_eq!(budget.record().unwrap(), 2);
        assert_eq!(budget.record().unwrap(), 3);
        match budget.record() {
            Err(PipelineError::BudgetExhausted { errors, budget }) => {
                assert_eq!(errors, 4);
                assert_eq!(budget, 3);
            }
            other => panic!("expected BudgetExhausted, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_budget_fails_first_error() {
        let mut budget = ErrorBudget::new(0);
        assert!(budget.record().is_err());
        assert_eq!(budget.errors(), 1);
    }
}
