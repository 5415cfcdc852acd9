// Ownership views derived from the ledger
//
// Nothing here is cached: every query folds over the blocks it is given,
// so the answer always matches the chain as it stands.

use std::collections::BTreeMap;

use super::block::Block;

/// Gets the current owner of a property
///
/// The owner recorded by the last REGISTER or TRANSFER block for the
/// property wins.
///
/// # Returns
///
/// The owner, or `None` if the property was never registered
pub fn current_owner<'a>(chain: &'a [Block], property_id: &str) -> Option<&'a str> {
    chain
        .iter()
        .filter(|block| block.property_id == property_id && block.action.assigns_owner())
        .last()
        .map(|block| block.owner.as_str())
}

/// Every block referencing a property, any action, in ledger order
///
/// The iterator is lazy and can be cloned to restart the walk.
pub fn history<'a>(chain: &'a [Block], property_id: &'a str) -> impl Iterator<Item = &'a Block> + Clone + 'a {
    chain.iter().filter(move |block| block.property_id == property_id)
}

pub fn is_registered(chain: &[Block], property_id: &str) -> bool {
    current_owner(chain, property_id).is_some()
}

/// Current owner of every registered property, keyed by property id
pub fn owners(chain: &[Block]) -> BTreeMap<String, String> {
    chain
        .iter()
        .filter(|block| block.action.assigns_owner())
        .fold(BTreeMap::new(), |mut owners, block| {
            owners.insert(block.property_id.clone(), block.owner.clone());
            owners
        })
}
