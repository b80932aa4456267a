//! Provisioning and download flows for field-deployed loggers.

use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use labpro_lib::{CommandReply, LabPro};
use tracing::{info, warn};

use crate::ledger::LoggerRecord;

/// Auto-ID sensor types the deployment accepts.
const RECOGNIZED_SENSORS: &[i64] = &[10, 34];

/// Sample slots available across all channels.
const SAMPLE_BUDGET: i64 = 12287;

/// Length of a deployment's sampling window: four days.
const LOG_WINDOW_SECS: i64 = 4 * 24 * 60 * 60;

/// Configure a fresh logger for unattended sampling.
///
/// Probes all four channels, keeps the recognized sensors, spreads the
/// sample budget over them and arms the sampling run. The returned record
/// belongs in the ledger; without it the download flow cannot rebuild the
/// time axis.
pub async fn setup(
    device: &mut LabPro,
    device_id: i64,
    description: String,
) -> Result<LoggerRecord> {
    let snapshot = device.get_device_status().await?;
    if snapshot.battery > 0.0 {
        // Nonzero here has meant a weak pack in the field.
        warn!(battery = snapshot.battery, "battery may be low");
    }

    device.do_command(0, &[]).await?; // soft reset
    device.do_command(6, &[3]).await?; // sound off, spares the battery
    device.do_command(6, &[5, device_id]).await?; // store our id as the system id

    let mut channels = [0.0f64; 4];
    let mut active: i64 = 0;
    for channel in 1..=4i64 {
        device.do_command(1, &[channel, 1]).await?;
        let sensor = device.get_sensor_status(channel).await?;
        if RECOGNIZED_SENSORS.contains(&(sensor as i64)) {
            let name = match device.do_command(116, &[channel]).await? {
                CommandReply::Text(name) => name.trim().to_string(),
                _ => String::new(),
            };
            info!(channel, sensor, name = %name, "found sensor");
            channels[(channel - 1) as usize] = sensor;
            active += 1;
        } else {
            // Nothing we recognize here; switch the channel back off.
            device.do_command(1, &[channel, 0]).await?;
        }
    }

    if active == 0 {
        bail!("no recognized sensors attached");
    }

    let samples = SAMPLE_BUDGET / active;
    let sample_time = LOG_WINDOW_SECS / samples;
    device
        .do_command(3, &[sample_time, samples, 0, 0, 0, 0, 0, 0, 0, 0])
        .await?;

    Ok(LoggerRecord {
        device_id,
        channel_1: channels[0],
        channel_2: channels[1],
        channel_3: channels[2],
        channel_4: channels[3],
        samples,
        sample_time,
        description,
        provisioned_at: Utc::now().timestamp(),
    })
}

/// Pull a logger's samples into `<system id>.csv` under `out_dir`.
///
/// Sampling is halted first. The time axis is rebuilt from the ledger row's
/// provisioning timestamp and the interval the device reports.
pub async fn download(
    device: &mut LabPro,
    record: &LoggerRecord,
    out_dir: &Path,
) -> Result<PathBuf> {
    device.do_command(6, &[0]).await?; // halt sampling
    let snapshot = device.get_device_status().await?; // refresh after the halt

    let step = snapshot.sample_time as i64;
    let count = snapshot.num_samples as i64;
    if step <= 0 || count <= 0 {
        bail!("device reports no collected samples (interval {step}, count {count})");
    }

    // One extra point so the axis reaches past the final sample.
    let start = record.provisioned_at;
    let mut columns: Vec<Vec<f64>> =
        vec![(0..=count).map(|i| (start + i * step) as f64).collect()];

    for (index, sensor) in record.channel_types().iter().enumerate() {
        if *sensor != 0.0 {
            let channel = index as i64 + 1;
            device.do_command(5, &[channel, 3, 0, 0]).await?; // select channel data
            let samples = device.get_data().await?;
            info!(channel, len = samples.len(), "downloaded channel");
            columns.push(samples);
        }
    }

    let path = out_dir.join(format!("{}.csv", snapshot.system_id as i64));
    let mut file =
        File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    writeln!(file, "# {}", record.description)?;

    let rows = columns.iter().map(|column| column.len()).min().unwrap_or(0);
    let mut writer = csv::Writer::from_writer(file);
    for row in 0..rows {
        writer.write_record(columns.iter().map(|column| column[row].to_string()))?;
    }
    writer.flush()?;

    Ok(path)
}
