//! Shared host utilities for wealthnode:
//! - Length-prefixed, padded frames over any `Read`/`Write` pair
//! - Shared `Msg` envelope for requests and replies
//! - `Host`, which executes framed calls against a registry on behalf of
//!   one authenticated caller per session

use std::io::{ErrorKind, Read, Write};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use wealthalgo::Coprocessor;
use wealthregistry::{Address, Caller, ComparisonRegistry, ADDRESS_LEN};

pub use wealthproto::{Call, Rejection, Reply, Request, PROTO_VER};

/// On-wire padding targets (bytes). Keep constant to avoid size side-channels.
///
/// Sized so every message fits one bucket while the candidate list holds at
/// most [`PADDED_CANDIDATES`] addresses and the key is at most
/// [`PADDED_KEY_BITS`] bits. Past that, frames grow by whole buckets.
pub const PAD_TO_SUBMIT: usize = 4096;
pub const PAD_TO_CALL: usize = 2048;
pub const PAD_TO_REPLY: usize = 2048;
pub const PADDED_CANDIDATES: usize = 100;
pub const PADDED_KEY_BITS: usize = 4096;
/// Largest frame body accepted by `read_msg`.
pub const MAX_FRAME: usize = 1 << 20;

#[derive(Debug, Serialize, Deserialize)]
pub enum Msg {
    Request(Request),
    Reply(Reply),
}

/// Padding bucket for a message. All submissions share one bucket whatever
/// ciphertext length they carry.
pub fn pad_for(msg: &Msg) -> usize {
    match msg {
        Msg::Request(Request {
            call: Call::Submit { .. },
            ..
        }) => PAD_TO_SUBMIT,
        Msg::Request(_) => PAD_TO_CALL,
        Msg::Reply(_) => PAD_TO_REPLY,
    }
}

// ------- Framing (length-prefixed + padded) -------

fn pad_len(len: usize, pad_to: usize) -> usize {
    (pad_to - (len % pad_to)) % pad_to
}

/// Send a single framed message: [u32 LE: byte_len] [payload + zero padding]
pub fn send_frame<W: Write + ?Sized>(w: &mut W, msg: &Msg) -> Result<()> {
    let mut bytes = bincode::serialize(msg)?;
    let bucket = pad_for(msg);
    if bytes.len() > bucket {
        warn!(len = bytes.len(), bucket, "message outgrows its padding bucket");
    }
    let rem = pad_len(bytes.len(), bucket);
    bytes.resize(bytes.len() + rem, 0u8);
    if bytes.len() > MAX_FRAME {
        bail!("frame of {} bytes exceeds limit {MAX_FRAME}", bytes.len());
    }
    let len_le = (bytes.len() as u32).to_le_bytes();
    w.write_all(&len_le)?;
    w.write_all(&bytes)?;
    w.flush()?;
    Ok(())
}

/// Read a single framed message; `None` on a clean end of stream. A stream
/// that ends inside a frame, including inside the length prefix, is an error.
pub fn read_msg<R: Read + ?Sized>(r: &mut R) -> Result<Option<Msg>> {
    let mut len_le = [0u8; 4];
    let first = loop {
        match r.read(&mut len_le[..1]) {
            Ok(got) => break got,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    };
    if first == 0 {
        return Ok(None);
    }
    r.read_exact(&mut len_le[1..])?;
    let n = u32::from_le_bytes(len_le) as usize;
    if n > MAX_FRAME {
        bail!("frame of {n} bytes exceeds limit {MAX_FRAME}");
    }

    let mut buf = vec![0u8; n];
    r.read_exact(&mut buf)?;

    // Trailing padding is zeros; try decode, fall back to trimming zeros.
    match bincode::deserialize::<Msg>(&buf) {
        Ok(m) => Ok(Some(m)),
        Err(_) => {
            while let Some(true) = buf.last().map(|b| *b == 0) {
                buf.pop();
            }
            Ok(Some(bincode::deserialize::<Msg>(&buf)?))
        }
    }
}

/// Deterministic participant address for a human-readable label, used by
/// the simulator and tests.
pub fn derive_address(label: &str) -> Address {
    let digest = blake3::hash(label.as_bytes());
    let mut out = [0u8; ADDRESS_LEN];
    out.copy_from_slice(&digest.as_bytes()[..ADDRESS_LEN]);
    Address::new(out)
}

// ------- Host -------

pub struct Host<C> {
    registry: ComparisonRegistry,
    cop: C,
}

impl<C: Coprocessor> Host<C> {
    pub fn new(registry: ComparisonRegistry, cop: C) -> Self {
        let bits = registry.public_key().bits();
        let max_candidates = registry.max_candidates();
        if bits > PADDED_KEY_BITS || max_candidates > PADDED_CANDIDATES {
            warn!(bits, max_candidates, "frames may outgrow their padding buckets");
        }
        Self { registry, cop }
    }

    pub fn registry(&self) -> &ComparisonRegistry {
        &self.registry
    }

    pub fn coprocessor(&self) -> &C {
        &self.cop
    }

    /// Execute one request as `caller`. Always produces exactly one reply.
    pub fn handle(&mut self, caller: &Caller, req: Request) -> Reply {
        if req.proto_ver != PROTO_VER {
            warn!(got = req.proto_ver, "unsupported protocol version");
            return Reply::Rejected(Rejection::UnsupportedVersion {
                got: req.proto_ver,
                expected: PROTO_VER,
            });
        }
        let outcome = match req.call {
            Call::Submit { ciphertext } => self
                .registry
                .submit(caller, ciphertext)
                .map(|()| Reply::Submitted),
            Call::HasSubmitted { who } => Ok(Reply::HasSubmitted(self.registry.has_submitted(&who))),
            Call::FindRichest { candidates } => self
                .registry
                .find_richest(&mut self.cop, &candidates)
                .map(Reply::Winner),
            Call::Richest => Ok(Reply::Richest(self.registry.richest())),
            Call::PublicKey => Ok(Reply::PublicKey(self.registry.public_key().clone())),
        };
        outcome.unwrap_or_else(|e| {
            debug!("call rejected: {e}");
            Reply::Rejected(Rejection::from(&e))
        })
    }

    /// Serve one session bound to `caller`: answer every framed request
    /// until the reader is exhausted. Returns the number of requests served.
    #[instrument(skip_all, fields(caller = %caller.address()))]
    pub fn serve<R: Read + ?Sized, W: Write + ?Sized>(
        &mut self,
        caller: Caller,
        r: &mut R,
        w: &mut W,
    ) -> Result<usize> {
        let mut served = 0;
        while let Some(msg) = read_msg(r)? {
            let req = match msg {
                Msg::Request(req) => req,
                Msg::Reply(other) => bail!("client sent a reply frame: {other:?}"),
            };
            let reply = self.handle(&caller, req);
            send_frame(w, &Msg::Reply(reply))?;
            served += 1;
        }
        info!(served, "session closed");
        Ok(served)
    }
}

/// In-process transport: frame `calls`, run them through one session of
/// `host` bound to `caller`, and decode the replies.
pub fn exchange<C: Coprocessor>(
    host: &mut Host<C>,
    caller: Caller,
    calls: Vec<Call>,
) -> Result<Vec<Reply>> {
    let mut inbound = Vec::new();
    for call in calls {
        send_frame(&mut inbound, &Msg::Request(Request::new(call)))?;
    }
    let mut outbound = Vec::new();
    host.serve(caller, &mut inbound.as_slice(), &mut outbound)?;

    let mut replies = Vec::new();
    let mut cursor = outbound.as_slice();
    while let Some(msg) = read_msg(&mut cursor)? {
        match msg {
            Msg::Reply(reply) => replies.push(reply),
            Msg::Request(other) => bail!("host sent a request frame: {other:?}"),
        }
    }
    Ok(replies)
}
