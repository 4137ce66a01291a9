//! OBEX Header Collections
//!
//! A [`HeaderSet`] is an ordered collection of typed headers; insertion
//! order is wire order. Each set carries an owner tag describing where it
//! came from: sets built by the application, sets assembled internally for a
//! request, and sets parsed out of server responses are kept apart so a
//! response set cannot be fed back into a request by accident.
//!
//! A set received from the server also records the response code of the
//! packet that carried it.

use crate::constants::MAX_HEADERS;
use crate::header::{Header, HeaderIdentifier};
use crate::packet::{PacketError, ResponseCode};
use heapless::Vec;

/// Origin of a header set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HeaderOwner {
    /// Parsed out of a server response
    Server,
    /// Assembled internally for a request
    Client,
    /// Built by the application
    ClientUser,
}

/// Ordered collection of OBEX headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderSet {
    owner: HeaderOwner,
    headers: Vec<Header, MAX_HEADERS>,
    response_code: Option<ResponseCode>,
}

impl HeaderSet {
    /// Create an empty application-owned set.
    #[must_use]
    pub const fn new() -> Self {
        Self::with_owner(HeaderOwner::ClientUser)
    }

    pub(crate) const fn with_owner(owner: HeaderOwner) -> Self {
        Self {
            owner,
            headers: Vec::new(),
            response_code: None,
        }
    }

    /// Owner tag of this set.
    #[must_use]
    pub const fn owner(&self) -> HeaderOwner {
        self.owner
    }

    /// Add a header, replacing an existing one with the same identifier in
    /// place. Authentication challenges accumulate instead of replacing,
    /// since a server may issue several at once.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::HeaderSetFull`] when the set is at capacity.
    pub fn add(&mut self, header: Header) -> Result<(), PacketError> {
        let id = header.identifier();
        if id != HeaderIdentifier::AuthenticationChallenge {
            if let Some(slot) = self.headers.iter_mut().find(|h| h.identifier() == id) {
                *slot = header;
                return Ok(());
            }
        }
        self.headers
            .push(header)
            .map_err(|_| PacketError::HeaderSetFull)
    }

    /// First header with the given identifier.
    #[must_use]
    pub fn get(&self, id: HeaderIdentifier) -> Option<&Header> {
        self.headers.iter().find(|h| h.identifier() == id)
    }

    /// Whether a header with the given identifier is present.
    #[must_use]
    pub fn contains(&self, id: HeaderIdentifier) -> bool {
        self.get(id).is_some()
    }

    /// Remove and return the first header with the given identifier.
    pub fn remove(&mut self, id: HeaderIdentifier) -> Option<Header> {
        let at = self.headers.iter().position(|h| h.identifier() == id)?;
        Some(self.headers.remove(at))
    }

    /// Headers in wire order.
    pub fn iter(&self) -> core::slice::Iter<'_, Header> {
        self.headers.iter()
    }

    /// Number of headers in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Whether the set holds no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Append every header of `other` whose identifier is absent here.
    /// Present identifiers keep their existing value.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::HeaderSetFull`] when the merge overflows the
    /// set; headers merged before the overflow are kept.
    pub fn merge(&mut self, other: &Self) -> Result<(), PacketError> {
        for header in other.iter() {
            if !self.contains(header.identifier()) {
                self.headers
                    .push(header.clone())
                    .map_err(|_| PacketError::HeaderSetFull)?;
            }
        }
        Ok(())
    }

    /// Response code of the exchange that produced this set, if any.
    #[must_use]
    pub const fn response_code(&self) -> Option<ResponseCode> {
        self.response_code
    }

    pub(crate) fn set_response_code(&mut self, code: ResponseCode) {
        self.response_code = Some(code);
    }

    /// Value of the NAME header, if present.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self.get(HeaderIdentifier::Name)? {
            Header::Name(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Value of the TYPE header, if present.
    #[must_use]
    pub fn object_type(&self) -> Option<&str> {
        match self.get(HeaderIdentifier::Type)? {
            Header::Type(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Value of the LENGTH header, if present.
    #[must_use]
    pub fn length(&self) -> Option<u32> {
        match self.get(HeaderIdentifier::Length)? {
            Header::Length(v) => Some(*v),
            _ => None,
        }
    }

    /// Value of the CONNECTION-ID header, if present.
    #[must_use]
    pub fn connection_id(&self) -> Option<u32> {
        match self.get(HeaderIdentifier::ConnectionId)? {
            Header::ConnectionId(v) => Some(*v),
            _ => None,
        }
    }

    /// Value of the WHO header, if present.
    #[must_use]
    pub fn who(&self) -> Option<&[u8]> {
        match self.get(HeaderIdentifier::Who)? {
            Header::Who(v) => Some(v),
            _ => None,
        }
    }

    /// Value of the TARGET header, if present.
    #[must_use]
    pub fn target(&self) -> Option<&[u8]> {
        match self.get(HeaderIdentifier::Target)? {
            Header::Target(v) => Some(v),
            _ => None,
        }
    }
}

impl Default for HeaderSet {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> IntoIterator for &'a HeaderSet {
    type Item = &'a Header;
    type IntoIter = core::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::UserValue;

    #[test]
    fn test_add_replaces_in_place() {
        let mut set = HeaderSet::new();
        set.add(Header::name("a.txt").unwrap()).unwrap();
        set.add(Header::Length(10)).unwrap();
        set.add(Header::name("b.txt").unwrap()).unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.name(), Some("b.txt"));
        // replacement keeps the original position
        assert_eq!(
            set.iter().next().unwrap().identifier(),
            HeaderIdentifier::Name
        );
    }

    #[test]
    fn test_challenges_accumulate() {
        let mut set = HeaderSet::with_owner(HeaderOwner::Server);
        let mut value = heapless::Vec::new();
        value.extend_from_slice(&[0x00, 0x01]).unwrap();
        set.add(Header::AuthenticationChallenge(value.clone()))
            .unwrap();
        set.add(Header::AuthenticationChallenge(value)).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_merge_keeps_existing() {
        let mut base = HeaderSet::new();
        base.add(Header::name("keep.txt").unwrap()).unwrap();

        let mut overlay = HeaderSet::new();
        overlay.add(Header::name("other.txt").unwrap()).unwrap();
        overlay.add(Header::Length(99)).unwrap();

        base.merge(&overlay).unwrap();
        assert_eq!(base.len(), 2);
        assert_eq!(base.name(), Some("keep.txt"));
        assert_eq!(base.length(), Some(99));
    }

    #[test]
    fn test_owner_tags() {
        assert_eq!(HeaderSet::new().owner(), HeaderOwner::ClientUser);
        assert_eq!(
            HeaderSet::with_owner(HeaderOwner::Server).owner(),
            HeaderOwner::Server
        );
    }

    #[test]
    fn test_capacity_limit() {
        let mut set = HeaderSet::new();
        for id in 0..MAX_HEADERS as u32 {
            let header = Header::user(0xF0 + (id as u8 & 0x0F), UserValue::Int(id)).unwrap();
            set.add(header).unwrap();
        }
        // distinct user ids fill the set
        assert_eq!(set.len(), MAX_HEADERS);
        assert_eq!(set.add(Header::Length(1)), Err(PacketError::HeaderSetFull));
    }

    #[test]
    fn test_typed_accessors() {
        let mut set = HeaderSet::new();
        set.add(Header::name("x").unwrap()).unwrap();
        set.add(Header::object_type("text/plain").unwrap()).unwrap();
        set.add(Header::Length(5)).unwrap();
        set.add(Header::ConnectionId(3)).unwrap();
        set.add(Header::who(b"srv").unwrap()).unwrap();

        assert_eq!(set.name(), Some("x"));
        assert_eq!(set.object_type(), Some("text/plain"));
        assert_eq!(set.length(), Some(5));
        assert_eq!(set.connection_id(), Some(3));
        assert_eq!(set.who(), Some(&b"srv"[..]));
        assert_eq!(set.target(), None);
    }
}
