use chrono::NaiveDate;

use crate::config::BeaconConfig;
use crate::identity::IdentityAnonymizer;

/// Execute the `identity` command: print the key a client gets on `day`.
pub fn execute(config: &BeaconConfig, ip: &str, user_agent: &str, day: Option<NaiveDate>) {
    let mut anonymizer = IdentityAnonymizer::new(config.identity.day_policy);
    if let Some(secret) = &config.identity.secret {
        anonymizer = anonymizer.with_secret(secret);
    }

    let day = day.unwrap_or_else(|| config.identity.day_policy.day_of(chrono::Utc::now()));
    println!("{}", anonymizer.derive(ip, user_agent, day));
}
