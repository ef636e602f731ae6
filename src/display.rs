use core::fmt::{Debug, Write};

use heapless::{String, Vec};
use log::{info, warn};

use crate::constants::{DISPLAY_LINE_WIDTH, DISPLAY_MAX_LINES};
use crate::geo::Offset;
use crate::metrics::LinkMetrics;
use crate::nmea::UtcTime;
use crate::readings::LastReceived;
use crate::record::Quantity;

pub type Line = String<DISPLAY_LINE_WIDTH>;
pub type Panel = Vec<Line, DISPLAY_MAX_LINES>;

/// Attached display, which only decides how many lines fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayKind {
    None,
    // 128x32 SSD1306
    Oled,
    // 128x128 ST7735
    Tft,
}

impl DisplayKind {
    pub const fn max_lines(self) -> usize {
        match self {
            DisplayKind::None => 0,
            DisplayKind::Oled => 3,
            DisplayKind::Tft => DISPLAY_MAX_LINES,
        }
    }
}

/// Text output device. Pixel drivers live outside this crate.
pub trait Screen {
    type Error: Debug;

    fn init(&mut self) -> Result<(), Self::Error>;

    /// Replaces the screen content.
    fn show(&mut self, lines: &[Line]);
}

/// Writes panels to the log.
#[derive(Debug, Default)]
pub struct ConsoleScreen;

impl Screen for ConsoleScreen {
    type Error = core::convert::Infallible;

    fn init(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn show(&mut self, lines: &[Line]) {
        for line in lines {
            info!("| {}", line);
        }
    }
}

/// Brings up the screen. A configured display that fails to start is an
/// error; with [`DisplayKind::None`] the failure is only logged.
pub fn init_screen<S: Screen>(screen: &mut S, kind: DisplayKind) -> Result<(), S::Error> {
    match screen.init() {
        Err(e) if kind == DisplayKind::None => {
            warn!("No display configured, ignoring init failure: {:?}", e);
            Ok(())
        }
        result => result,
    }
}

/// Clock time shifted into the local zone, wrapping around midnight.
pub fn local_time(utc: UtcTime, utc_offset_hours: i8) -> UtcTime {
    let hour = (i16::from(utc.hour) + i16::from(utc_offset_hours)).rem_euclid(24);
    UtcTime {
        hour: hour as u8,
        ..utc
    }
}

/// What a publisher shows after each cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublisherView<'a> {
    pub offset: Offset,
    pub clock: Option<UtcTime>,
    pub metrics: LinkMetrics,
    pub device_id: &'a str,
}

pub fn publisher_panel(kind: DisplayKind, view: &PublisherView<'_>) -> Panel {
    let mut panel = PanelWriter::new(kind);

    panel.line(format_args!("Latitude: {:.2} m", view.offset.north_m));
    panel.line(format_args!("Longitude: {:.2} m", view.offset.east_m));
    match view.clock {
        Some(t) => panel.line(format_args!(
            "Time: {:02}:{:02}:{:02}",
            t.hour, t.minute, t.second
        )),
        None => panel.line(format_args!("Time: --:--:--")),
    }
    panel.line(format_args!("RSSI: {:.0} dBm", view.metrics.rssi));
    panel.line(format_args!("Down: {:.2} Mbps", view.metrics.downlink_mbps));
    panel.line(format_args!("Up: {:.2} Mbps", view.metrics.uplink_mbps));
    panel.line(format_args!("Device: {}", view.device_id));

    panel.finish()
}

/// Last received values, `--` for fields that never arrived.
pub fn consumer_panel(kind: DisplayKind, last: &LastReceived) -> Panel {
    let mut panel = PanelWriter::new(kind);
    let field = |q| last.get(q).unwrap_or("--");

    panel.line(format_args!("Device: {}", field(Quantity::DeviceId)));
    panel.line(format_args!("RSSI: {} dBm", field(Quantity::Rssi)));
    panel.line(format_args!("Down: {} Mbps", field(Quantity::Downlink)));
    panel.line(format_args!("Up: {} Mbps", field(Quantity::Uplink)));
    panel.line(format_args!("Lat: {}", field(Quantity::Latitude)));
    panel.line(format_args!("Lon: {}", field(Quantity::Longitude)));
    panel.line(format_args!("Time: {}", field(Quantity::Timestamp)));
    panel.line(format_args!("Messages: {}", last.messages()));

    panel.finish()
}

struct PanelWriter {
    lines: Panel,
    max_lines: usize,
}

impl PanelWriter {
    fn new(kind: DisplayKind) -> Self {
        Self {
            lines: Panel::new(),
            max_lines: kind.max_lines(),
        }
    }

    // Lines past the display height are dropped, long lines are cut at the width.
    fn line(&mut self, args: core::fmt::Arguments<'_>) {
        if self.lines.len() >= self.max_lines {
            return;
        }
        let mut line = CutLine(Line::new());
        let _ = line.write_fmt(args);
        let _ = self.lines.push(line.0);
    }

    fn finish(self) -> Panel {
        self.lines
    }
}

/// Keeps whatever fits in the line and silently drops the rest.
struct CutLine(Line);

impl Write for CutLine {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for c in s.chars() {
            if self.0.push(c).is_err() {
                break;
            }
        }
        Ok(())
    }
}
