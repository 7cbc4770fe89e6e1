use std::collections::HashMap;

use crate::error::IntegrityError;
use crate::models::{HostAggregate, UserDirectory};
use crate::recipients;

/// The hosts a single address is notified about, in sequencer order.
#[derive(Debug)]
pub struct Digest<'a> {
    pub address: String,
    pub hosts: Vec<&'a HostAggregate>,
}

/// Digests for every address reached in a run, in order of first encounter.
#[derive(Debug, Default)]
pub struct NotificationDigest<'a> {
    digests: Vec<Digest<'a>>,
    index: HashMap<String, usize>,
}

impl<'a> NotificationDigest<'a> {
    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, address: &str) -> Option<&[&'a HostAggregate]> {
        self.index
            .get(address)
            .map(|&slot| self.digests[slot].hosts.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Digest<'a>> {
        self.digests.iter()
    }

    fn push(&mut self, address: String, host: &'a HostAggregate) {
        match self.index.get(&address) {
            Some(&slot) => self.digests[slot].hosts.push(host),
            None => {
                self.index.insert(address.clone(), self.digests.len());
                self.digests.push(Digest {
                    address,
                    hosts: vec![host],
                });
            }
        }
    }
}

/// Fans ordered aggregates out to the addresses of their configured users.
pub fn fanout<'a>(
    ordered: &'a [HostAggregate],
    directory: &UserDirectory,
) -> Result<NotificationDigest<'a>, IntegrityError> {
    fanout_with(ordered, |host| {
        recipients::resolve(&host.host_id, host.recipients.as_ref(), directory)
    })
}

/// Like [`fanout`], with the address lookup supplied by the caller. Hosts
/// that resolve to no address are skipped.
pub fn fanout_with<'a, F>(
    ordered: &'a [HostAggregate],
    mut resolve: F,
) -> Result<NotificationDigest<'a>, IntegrityError>
where
    F: FnMut(&HostAggregate) -> Result<Vec<String>, IntegrityError>,
{
    let mut digest = NotificationDigest::default();

    for host in ordered {
        for address in resolve(host)? {
            digest.push(address, host);
        }
    }

    Ok(digest)
}
