use std::time::Duration;

use bytes::Bytes;
use nusb::{DeviceInfo, Interface, transfer::RequestBuffer};
use tracing::{debug, info, trace};

use crate::command::{Command, CommandReply, ResponseKind, parse_values};
use crate::error::LabProError;
use crate::status::DeviceStatus;

// Constants for USB device identification
pub const VID: u16 = 0x08F7;
pub const PID: u16 = 0x0001;
pub const INTERFACE: u8 = 0;
pub const ENDPOINT_OUT: u8 = 0x02;
pub const ENDPOINT_IN: u8 = 0x82;

/// Packet size the device uses on its bulk IN endpoint.
pub const PACKET_SIZE: usize = 64;

// Per-operation deadlines for bulk transfers.
const WRITE_TIMEOUT: Duration = Duration::from_millis(200);
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Packets drained per response before the link is considered wedged.
const MAX_RESPONSE_PACKETS: usize = 4096;

const STATUS_OPCODE: u16 = 7;
const SENSOR_STATUS_OPCODE: u16 = 8;

/// USB identity of a LabPro-family logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceAddress {
    pub vendor_id: u16,
    pub product_id: u16,
    pub interface: u8,
}

impl Default for DeviceAddress {
    fn default() -> Self {
        Self {
            vendor_id: VID,
            product_id: PID,
            interface: INTERFACE,
        }
    }
}

/// Bounded retry with a fixed delay between attempts.
///
/// Supplied by the caller for device discovery and for status polling, both
/// of which would otherwise spin forever on an absent or warming-up device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts before giving up.
    pub attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay: Duration::from_millis(500),
        }
    }
}

/// Raw bulk pipe to the device.
///
/// [`UsbLink`] is the production implementation; tests substitute a scripted
/// link. A `None` from `read_packet` means the endpoint had nothing more to
/// say within the read deadline, which is how the device marks the end of a
/// response.
#[allow(async_fn_in_trait)]
pub trait BulkLink {
    async fn write_packet(&mut self, bytes: Vec<u8>) -> Result<(), LabProError>;
    async fn read_packet(&mut self, max_len: usize) -> Result<Option<Bytes>, LabProError>;
}

/// Bulk transport over a claimed nusb interface.
pub struct UsbLink {
    interface: Interface,
}

impl BulkLink for UsbLink {
    async fn write_packet(&mut self, bytes: Vec<u8>) -> Result<(), LabProError> {
        trace!(len = bytes.len(), "bulk write");
        let transfer = self.interface.bulk_out(ENDPOINT_OUT, bytes);
        let completion = tokio::time::timeout(WRITE_TIMEOUT, transfer).await?;
        completion.into_result()?;
        Ok(())
    }

    async fn read_packet(&mut self, max_len: usize) -> Result<Option<Bytes>, LabProError> {
        let transfer = self.interface.bulk_in(ENDPOINT_IN, RequestBuffer::new(max_len));
        let completion = match tokio::time::timeout(READ_TIMEOUT, transfer).await {
            Ok(completion) => completion,
            // The endpoint going quiet is how the device ends a response.
            Err(_) => return Ok(None),
        };
        let data = completion.into_result()?;
        trace!(len = data.len(), "bulk read");
        if data.is_empty() {
            return Ok(None);
        }
        Ok(Some(Bytes::from(data)))
    }
}

/// Scan the bus for `address`, retrying under `policy` before giving up.
pub async fn locate(address: DeviceAddress, policy: RetryPolicy) -> Result<DeviceInfo, LabProError> {
    info!(
        "Searching for LabPro {:04x}:{:04x}...",
        address.vendor_id, address.product_id
    );
    let mut attempt = 0;
    loop {
        let found = nusb::list_devices()?.find(|d| {
            d.vendor_id() == address.vendor_id && d.product_id() == address.product_id
        });
        if let Some(device_info) = found {
            return Ok(device_info);
        }
        attempt += 1;
        if attempt >= policy.attempts {
            return Err(LabProError::DeviceNotFound);
        }
        debug!(attempt, "device not on the bus yet, retrying");
        tokio::time::sleep(policy.delay).await;
    }
}

/// An open, interface-claimed connection to a LabPro logger.
///
/// Exactly one connection may exist per physical device; the logger has no
/// notion of concurrent hosts. Commands are strictly sequential: each one is
/// written in full and its response drained before the next is issued.
pub struct LabPro<L = UsbLink> {
    link: L,
    poll: RetryPolicy,
    max_response_packets: usize,
    status: Option<DeviceStatus>,
}

impl LabPro<UsbLink> {
    /// Find, claim and wake the first LabPro on the bus.
    pub async fn open() -> Result<Self, LabProError> {
        Self::open_with(DeviceAddress::default(), RetryPolicy::default()).await
    }

    /// Open a specific device identity under a caller-supplied discovery
    /// policy.
    pub async fn open_with(
        address: DeviceAddress,
        discovery: RetryPolicy,
    ) -> Result<Self, LabProError> {
        let device_info = locate(address, discovery).await?;
        info!(
            "Found device on bus {} addr {}",
            device_info.bus_number(),
            device_info.device_address()
        );

        let device = device_info.open()?;

        // Linux selects the configuration on its own; macOS leaves it unset
        // and the interface claim fails without this step.
        #[cfg(target_os = "macos")]
        device.set_configuration(1)?;

        let interface = device.detach_and_claim_interface(address.interface)?;
        info!("Interface claimed successfully.");

        let mut labpro = Self::from_link(UsbLink { interface });
        // A bare `s` frame brings the logger out of standby.
        labpro.write_frame("s").await?;
        Ok(labpro)
    }
}

impl<L: BulkLink> LabPro<L> {
    /// Wrap an already-established link. Production code goes through
    /// [`LabPro::open`]; this seam exists for alternate transports and tests.
    pub fn from_link(link: L) -> Self {
        Self {
            link,
            poll: RetryPolicy::default(),
            max_response_packets: MAX_RESPONSE_PACKETS,
            status: None,
        }
    }

    /// Replace the status polling policy.
    pub fn with_poll_policy(mut self, poll: RetryPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Cap the number of packets a single response may span.
    pub fn with_response_cap(mut self, max_packets: usize) -> Self {
        self.max_response_packets = max_packets;
        self
    }

    /// Last snapshot observed by [`LabPro::get_device_status`].
    pub fn status(&self) -> Option<&DeviceStatus> {
        self.status.as_ref()
    }

    /// Release the device. Consuming the connection makes a double release
    /// unrepresentable.
    pub fn close(self) {
        info!("Closing LabPro connection");
    }

    /// Tear down the wrapper and hand back the underlying link.
    pub fn into_link(self) -> L {
        self.link
    }

    /// Frame a payload (single CR terminator, no escaping) and send it.
    /// Payload text must not itself contain a bare CR outside the command
    /// envelope convention.
    async fn write_frame(&mut self, payload: &str) -> Result<(), LabProError> {
        debug!(frame = ?payload, "frame out");
        let mut frame = Vec::with_capacity(payload.len() + 1);
        frame.extend_from_slice(payload.as_bytes());
        frame.push(b'\r');
        self.link.write_packet(frame).await
    }

    /// Drain the endpoint into one logical response.
    ///
    /// Zero bytes inside a packet are padding and dropped; a read yielding
    /// nothing ends the response. The packet cap guards against a link that
    /// never goes quiet.
    async fn read_response(&mut self) -> Result<String, LabProError> {
        let mut text = String::new();
        let mut packets = 0;
        while let Some(packet) = self.link.read_packet(PACKET_SIZE).await? {
            packets += 1;
            if packets > self.max_response_packets {
                return Err(LabProError::ResponseOverrun {
                    max_packets: self.max_response_packets,
                });
            }
            text.extend(packet.iter().filter(|&&b| b != 0).map(|&b| char::from(b)));
        }
        debug!(response = ?text, "frame in");
        Ok(text)
    }

    /// Send a raw payload and return whatever the device streams back,
    /// unclassified. The console's `s`/`g` passthrough uses this.
    pub async fn send_raw(&mut self, payload: &str) -> Result<String, LabProError> {
        self.write_frame(payload).await?;
        self.read_response().await
    }

    /// Send a structured command and classify its response by opcode.
    pub async fn do_command(
        &mut self,
        opcode: u16,
        args: &[i64],
    ) -> Result<CommandReply, LabProError> {
        let command = Command::new(opcode, args);
        debug!(opcode, ?args, "dispatching command");
        self.write_frame(&command.encode()).await?;
        let raw = self.read_response().await?;
        let reply = match command.kind() {
            ResponseKind::NumericVector => CommandReply::Values(parse_values(&raw)?),
            ResponseKind::Text => CommandReply::Text(raw),
            ResponseKind::None => CommandReply::None,
        };
        Ok(reply)
    }

    /// Poll the status command until the logger reports a complete snapshot,
    /// then cache and return it.
    ///
    /// Warm-up and mid-transaction frames come back short or without the
    /// sentinel; those are discarded and the poll repeated under the
    /// connection's poll policy.
    pub async fn get_device_status(&mut self) -> Result<DeviceStatus, LabProError> {
        for attempt in 1..=self.poll.attempts {
            let values = self
                .do_command(STATUS_OPCODE, &[])
                .await?
                .into_values()
                .unwrap_or_default();
            if let Some(snapshot) = DeviceStatus::from_vector(&values) {
                self.status = Some(snapshot);
                return Ok(snapshot);
            }
            debug!(attempt, len = values.len(), "incomplete status frame, repolling");
            if attempt < self.poll.attempts {
                tokio::time::sleep(self.poll.delay).await;
            }
        }
        Err(LabProError::StatusTimeout {
            attempts: self.poll.attempts,
        })
    }

    /// Probe the sensor attached to a channel; the first element of the
    /// reply identifies the sensor type.
    pub async fn get_sensor_status(&mut self, channel: i64) -> Result<f64, LabProError> {
        let reply = self.do_command(SENSOR_STATUS_OPCODE, &[channel, 0]).await?;
        match reply {
            CommandReply::Values(values) if !values.is_empty() => Ok(values[0]),
            _ => Err(LabProError::Protocol(format!(
                "empty sensor status reply for channel {channel}"
            ))),
        }
    }

    /// Request the collected sample stream and parse it as one numeric
    /// vector.
    ///
    /// This is the bare `g` request, not an `s{...}` command; the device
    /// answers with the samples of whichever channel was last selected.
    pub async fn get_data(&mut self) -> Result<Vec<f64>, LabProError> {
        self.write_frame("g\r").await?;
        let raw = self.read_response().await?;
        parse_values(&raw)
    }
}
