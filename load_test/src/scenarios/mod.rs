//! Scenarios run by the sessions of each phase.
//!
//! Steps of a session run in order and the first failing step ends the
//! session. Sessions only see each other through the registry cache.

pub mod discovery;
pub mod ingestion;
pub mod registration;
pub mod setup;

use std::fmt;

use loadtest_core::LoadTestResult;

use crate::context::RunContext;
use crate::session::SessionContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    /// Organization, source types and project
    Setup,
    /// Project sources, subject and token pair of one participant
    Registration,
    /// Key and value schema ids of every topic
    Discovery,
    /// One batch of questionnaires sent to the gateway
    Ingestion,
}

impl Scenario {
    pub fn name(&self) -> &'static str {
        match self {
            Scenario::Setup => "setup",
            Scenario::Registration => "registration",
            Scenario::Discovery => "discovery",
            Scenario::Ingestion => "ingestion",
        }
    }

    pub async fn run(self, context: &RunContext, session: &mut SessionContext) -> LoadTestResult<()> {
        match self {
            Scenario::Setup => setup::run(context, session).await,
            Scenario::Registration => registration::run(context, session).await,
            Scenario::Discovery => discovery::run(context, session).await,
            Scenario::Ingestion => ingestion::run(context, session).await,
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
