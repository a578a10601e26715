//! Addressee resolution against local-authority rules.

use crate::config::AuthorityRules;
use crate::model::audience::{Audience, AudienceSet};
use crate::model::post::{AddresseeSubject, Mention};

/// Audience for one addressee, or `None` when the subject is not local.
///
/// The public collection has no home authority and always resolves.
pub fn resolve_addressee(subject: &AddresseeSubject, rules: &impl AuthorityRules) -> Option<Audience> {
    match subject {
        AddresseeSubject::Public => Some(Audience::Public),
        AddresseeSubject::Profile(profile) if rules.is_local(&profile.authority) => {
            Some(Audience::addressed(profile.id))
        }
        AddresseeSubject::Followers(owner) if rules.is_local(&owner.authority) => {
            Some(Audience::followers(owner.id))
        }
        AddresseeSubject::Profile(_) | AddresseeSubject::Followers(_) => None,
    }
}

/// Local audiences for every resolvable entry of `mentions`.
pub fn resolve_local_addressees(mentions: &[Mention], rules: &impl AuthorityRules) -> AudienceSet {
    mentions
        .iter()
        .filter_map(|mention| resolve_addressee(&mention.subject, rules))
        .collect()
}
