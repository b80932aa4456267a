//! Common test utilities: a scripted stand-in for the USB link.

use std::collections::VecDeque;

use bytes::Bytes;
use labpro_lib::device::BulkLink;
use labpro_lib::error::LabProError;

/// Replays a canned sequence of read results and records every frame written
/// to it. Once the script runs out, reads report the no-data condition, just
/// like a quiet endpoint.
#[derive(Default)]
pub struct MockLink {
    pub reads: VecDeque<Option<Bytes>>,
    pub written: Vec<Vec<u8>>,
    /// When set, served after the script is exhausted. Simulates a link that
    /// never goes quiet.
    pub endless: Option<Bytes>,
}

impl MockLink {
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one data packet.
    #[allow(dead_code)]
    pub fn push_packet(&mut self, bytes: &[u8]) {
        self.reads.push_back(Some(Bytes::copy_from_slice(bytes)));
    }

    /// Queue the no-data read that terminates a response.
    #[allow(dead_code)]
    pub fn push_end(&mut self) {
        self.reads.push_back(None);
    }

    /// Queue an entire textual response split across 64-byte packets,
    /// followed by the terminating no-data read.
    #[allow(dead_code)]
    pub fn push_response(&mut self, text: &str) {
        for chunk in text.as_bytes().chunks(64) {
            self.push_packet(chunk);
        }
        self.push_end();
    }
}

impl BulkLink for MockLink {
    async fn write_packet(&mut self, bytes: Vec<u8>) -> Result<(), LabProError> {
        self.written.push(bytes);
        Ok(())
    }

    async fn read_packet(&mut self, _max_len: usize) -> Result<Option<Bytes>, LabProError> {
        match self.reads.pop_front() {
            Some(read) => Ok(read),
            None => Ok(self.endless.clone()),
        }
    }
}

/// A 17-element status body with the sentinel in its documented slot.
#[allow(dead_code)]
pub fn status_body(system_id: f64) -> String {
    format!(
        "{{1.1,0,2.5,8888,60,0,1,0,0,100,0,21.5,0,3,0,0,{system_id}}}\r\n"
    )
}
