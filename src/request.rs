//! Decoding of incoming queries from the URL path or a request body.

use std::str::FromStr;

use bitcoin::{
    consensus::encode::{deserialize, serialize},
    OutPoint, Txid,
};

use crate::error::QueryError;
use crate::types::Query;

/// Path segment that turns on pool lookups for the whole query.
pub const CHECK_MEMPOOL: &str = "checkmempool";

/// Size of one serialized outpoint in the binary request body.
pub const OUTPOINT_SIZE: usize = 36;

const FLAG_CHECK_MEMPOOL: u8 = 0x01;

/// Encoding selected by the suffix of the request path.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RestFormat {
    Json,
    Bin,
    Hex,
}

impl RestFormat {
    pub fn suffix(self) -> &'static str {
        match self {
            RestFormat::Json => "json",
            RestFormat::Bin => "bin",
            RestFormat::Hex => "hex",
        }
    }

    /// Split `path` into its stem and format, e.g. `"utxos.bin"` into
    /// `("utxos", RestFormat::Bin)`.
    pub fn split_path(path: &str) -> Result<(&str, RestFormat), QueryError> {
        let (stem, suffix) = path
            .rsplit_once('.')
            .ok_or_else(|| QueryError::UnsupportedFormat(String::new()))?;
        Ok((stem, suffix.parse()?))
    }
}

impl FromStr for RestFormat {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(RestFormat::Json),
            "bin" => Ok(RestFormat::Bin),
            "hex" => Ok(RestFormat::Hex),
            other => Err(QueryError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// A query as it arrived, before decoding into a [`Query`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum RawQuery<'a> {
    /// `/`-separated segments: an optional [`CHECK_MEMPOOL`] marker followed
    /// by `<txid>-<vout>` references.
    PathForm(Vec<&'a str>),
    /// Flag byte followed by consensus-encoded outpoints.
    BinaryForm(&'a [u8]),
}

impl<'a> RawQuery<'a> {
    /// Segments of a textual query such as `checkmempool/<txid>-0/<txid>-1`.
    pub fn from_text(text: &'a str) -> Self {
        RawQuery::PathForm(text.split('/').collect())
    }

    pub fn decode(&self) -> Result<Query, QueryError> {
        match self {
            RawQuery::PathForm(segments) => parse_path_form(segments),
            RawQuery::BinaryForm(bytes) => parse_binary_form(bytes),
        }
    }
}

fn parse_path_form(segments: &[&str]) -> Result<Query, QueryError> {
    let (check_mempool, references) = match segments.split_first() {
        Some((first, rest)) if *first == CHECK_MEMPOOL => (true, rest),
        _ => (false, segments),
    };
    if references.is_empty() {
        return Err(QueryError::MalformedReference(
            "no outpoints requested".to_string(),
        ));
    }

    let outpoints = references
        .iter()
        .map(|segment| parse_outpoint(segment))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Query::new(outpoints, check_mempool))
}

/// Parse a `<txid>-<vout>` reference.
pub fn parse_outpoint(segment: &str) -> Result<OutPoint, QueryError> {
    let malformed = || QueryError::MalformedReference(segment.to_string());
    let (txid, vout) = segment.split_once('-').ok_or_else(malformed)?;
    let txid = parse_txid(txid).map_err(|_| malformed())?;
    if vout.is_empty() || !vout.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    let vout = vout.parse::<u32>().map_err(|_| malformed())?;
    Ok(OutPoint::new(txid, vout))
}

/// Parse a transaction id written as 64 hex characters.
pub fn parse_txid(s: &str) -> Result<Txid, QueryError> {
    let malformed = || QueryError::MalformedReference(s.to_string());
    if s.len() != 64 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(malformed());
    }
    Txid::from_str(s).map_err(|_| malformed())
}

fn parse_binary_form(bytes: &[u8]) -> Result<Query, QueryError> {
    let (flag, records) = bytes.split_first().ok_or(QueryError::EmptyQuery)?;
    if records.len() % OUTPOINT_SIZE != 0 {
        return Err(QueryError::TruncatedInput(records.len()));
    }
    if records.is_empty() {
        return Err(QueryError::EmptyQuery);
    }

    let outpoints = records
        .chunks_exact(OUTPOINT_SIZE)
        .map(|chunk| {
            deserialize::<OutPoint>(chunk)
                .map_err(|e| QueryError::MalformedReference(e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Query::new(outpoints, flag & FLAG_CHECK_MEMPOOL != 0))
}

/// Path segments for `query`, in the form [`RawQuery::PathForm`] accepts.
pub fn encode_path_form(query: &Query) -> String {
    let mut segments = Vec::with_capacity(query.outpoints.len() + 1);
    if query.check_mempool {
        segments.push(CHECK_MEMPOOL.to_string());
    }
    for outpoint in &query.outpoints {
        segments.push([outpoint.txid.to_string(), outpoint.vout.to_string()].join("-"));
    }
    segments.join("/")
}

/// Body bytes for `query`, in the form [`RawQuery::BinaryForm`] accepts.
pub fn encode_binary_form(query: &Query) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(1 + query.outpoints.len() * OUTPOINT_SIZE);
    bytes.push(if query.check_mempool {
        FLAG_CHECK_MEMPOOL
    } else {
        0
    });
    for outpoint in &query.outpoints {
        bytes.extend_from_slice(&serialize(outpoint));
    }
    bytes
}
