//! SH1106 OLED display driver
//!
//! Drives a 128x64 SH1106 panel over I2C. Drawing happens in a local
//! [`FrameBuffer`]; [`Sh1106::flush`] only sends the pages that changed.
//!
//! Every transfer starts with a control byte: `0x00` for a command stream,
//! `0x40` for display RAM data. The SH1106 has 132 columns of RAM and most
//! 128-pixel modules are wired to columns 2..130, hence the column offset.

use kestrel_hal::i2c::{DeviceAddress, I2cBus, I2cError};

use crate::framebuffer::{DirtyMask, FrameBuffer};

/// Default SH1106 I2C address (0x3D with SA0 pulled high)
pub const DEFAULT_ADDRESS: u8 = 0x3C;

/// Pages reachable with a page-select command (`0xB0..=0xB7`)
pub const MAX_PAGES: usize = 8;

/// Columns of display RAM
pub const RAM_COLUMNS: usize = 132;

/// Control bytes
mod control {
    pub const COMMAND: u8 = 0x00;
    pub const DATA: u8 = 0x40;
}

/// SH1106 commands
#[allow(dead_code)]
mod cmd {
    pub const DISPLAY_OFF: u8 = 0xAE;
    pub const DISPLAY_ON: u8 = 0xAF;
    pub const SET_CONTRAST: u8 = 0x81;
    pub const SET_NORMAL: u8 = 0xA6;
    pub const SET_INVERSE: u8 = 0xA7;
    pub const RESUME_FROM_RAM: u8 = 0xA4;
    pub const SET_DISPLAY_OFFSET: u8 = 0xD3;
    pub const SET_COM_PINS: u8 = 0xDA;
    pub const SET_VCOM_DETECT: u8 = 0xDB;
    pub const SET_CLOCK_DIV: u8 = 0xD5;
    pub const SET_PRECHARGE: u8 = 0xD9;
    pub const SET_MUX_RATIO: u8 = 0xA8;
    pub const SET_LOW_COLUMN: u8 = 0x00;
    pub const SET_HIGH_COLUMN: u8 = 0x10;
    pub const SET_PAGE_ADDR: u8 = 0xB0;
    pub const SET_START_LINE: u8 = 0x40;
    pub const SET_SEG_REMAP: u8 = 0xA1;
    pub const SET_COM_SCAN_DEC: u8 = 0xC8;
    pub const SET_DCDC: u8 = 0xAD;
    pub const DCDC_ON: u8 = 0x8B;
    pub const DEACTIVATE_SCROLL: u8 = 0x2E;
}

/// Panel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sh1106Config {
    /// 7-bit bus address
    pub address: u8,
    /// First RAM column of the visible area
    pub column_offset: u8,
    /// Contrast applied by `init`
    pub contrast: u8,
}

impl Default for Sh1106Config {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            column_offset: 2,
            contrast: 0x7F,
        }
    }
}

/// Outcome of one [`Sh1106::flush`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlushReport {
    /// Pages that were sent and are now clean
    pub flushed: DirtyMask,
    /// Pages whose transfer failed; they stay dirty
    pub failed: DirtyMask,
    /// First error seen during the flush
    pub error: Option<I2cError>,
}

impl FlushReport {
    /// True when no page failed
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// `Err` with the first error if any page failed
    pub fn into_result(self) -> Result<DirtyMask, I2cError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.flushed),
        }
    }
}

/// SH1106 OLED driver
///
/// Owns the bus and a frame buffer. The default size is the common
/// 128x64 module. Larger buffers than the controller can address are
/// rejected at compile time:
///
/// ```compile_fail
/// use kestrel_display::{FrameBuffer, Sh1106, Sh1106Config};
/// use kestrel_hal::i2c::{DeviceAddress, I2cBus, I2cError};
///
/// struct NoBus;
///
/// impl I2cBus for NoBus {
///     fn write_chunks(&mut self, _: DeviceAddress, _: &[&[u8]]) -> Result<usize, I2cError> {
///         Ok(0)
///     }
///     fn read_registers(&mut self, _: DeviceAddress, _: u8, _: &mut [u8]) -> Result<usize, I2cError> {
///         Ok(0)
///     }
///     fn read_raw_bytes(&mut self, _: DeviceAddress, _: &mut [u8]) -> Result<usize, I2cError> {
///         Ok(0)
///     }
/// }
///
/// let buffer = FrameBuffer::<128, 16>::new();
/// let _oled = Sh1106::with_buffer(NoBus, Sh1106Config::default(), buffer);
/// ```
pub struct Sh1106<B, const WIDTH: usize = 128, const PAGES: usize = 8> {
    bus: B,
    config: Sh1106Config,
    buffer: FrameBuffer<WIDTH, PAGES>,
}

impl<B: I2cBus> Sh1106<B> {
    /// Create a driver for a 128x64 panel
    pub fn new(bus: B, config: Sh1106Config) -> Self {
        Self::with_buffer(bus, config, FrameBuffer::new())
    }
}

impl<B: I2cBus, const WIDTH: usize, const PAGES: usize> Sh1106<B, WIDTH, PAGES> {
    const FITS_CONTROLLER: () = assert!(
        PAGES <= MAX_PAGES && WIDTH <= RAM_COLUMNS,
        "buffer larger than SH1106 RAM"
    );

    /// Create a driver around an existing frame buffer
    pub fn with_buffer(bus: B, config: Sh1106Config, buffer: FrameBuffer<WIDTH, PAGES>) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::FITS_CONTROLLER;
        Self {
            bus,
            config,
            buffer,
        }
    }

    fn address(&self) -> DeviceAddress {
        DeviceAddress::new(self.config.address)
    }

    /// Initialize the display
    ///
    /// Sends the power-up command sequence in one transfer, then blanks the
    /// frame buffer and marks every page dirty so the next flush repaints
    /// the whole panel. The buffer is reset even if the bus write fails.
    pub fn init(&mut self) -> Result<(), I2cError> {
        let init_cmds: [u8; 25] = [
            control::COMMAND,
            cmd::DISPLAY_OFF,
            cmd::SET_SEG_REMAP,
            cmd::SET_COM_SCAN_DEC,
            cmd::SET_MUX_RATIO,
            0x3F, // 1/64
            cmd::SET_DISPLAY_OFFSET,
            0x00,
            cmd::SET_START_LINE,
            cmd::SET_NORMAL,
            cmd::RESUME_FROM_RAM,
            cmd::SET_CLOCK_DIV,
            0xF0,
            cmd::SET_PRECHARGE,
            0xF1,
            cmd::SET_COM_PINS,
            0x12,
            cmd::SET_VCOM_DETECT,
            0x40,
            cmd::SET_CONTRAST,
            self.config.contrast,
            cmd::SET_DCDC,
            cmd::DCDC_ON,
            cmd::DEACTIVATE_SCROLL,
            cmd::DISPLAY_ON,
        ];

        let address = self.address();
        let result = self.bus.write_bytes(address, &init_cmds).map(|_| ());

        self.buffer.fill(false);
        self.buffer.mark_all_dirty();

        if let Err(err) = result {
            warn!("sh1106 init failed: {}", err);
        }
        result
    }

    /// Send every dirty page to the display
    ///
    /// Pages go out in ascending order. A page is marked clean only after
    /// both its page-select and data transfers succeed; a failed page is
    /// left dirty and the flush moves on to the next one.
    pub fn flush(&mut self) -> FlushReport {
        let mut report = FlushReport::default();
        let address = self.address();
        let offset = self.config.column_offset;

        for page in self.buffer.dirty().iter() {
            let select = [
                control::COMMAND,
                cmd::SET_PAGE_ADDR | page as u8,
                cmd::SET_LOW_COLUMN | (offset & 0x0F),
                cmd::SET_HIGH_COLUMN | (offset >> 4),
            ];

            let Some(bytes) = self.buffer.page(page) else {
                continue;
            };

            let result = self
                .bus
                .write_bytes(address, &select)
                .and_then(|_| self.bus.write_chunks(address, &[&[control::DATA][..], &bytes[..]]));

            match result {
                Ok(_) => {
                    self.buffer.mark_clean(page);
                    report.flushed.set(page);
                }
                Err(err) => {
                    warn!("sh1106 page {} flush failed: {}", page, err);
                    report.failed.set(page);
                    report.error.get_or_insert(err);
                }
            }
        }

        trace!(
            "sh1106 flush: {} sent, {} failed",
            report.flushed.count(),
            report.failed.count()
        );
        report
    }

    /// Set or clear one pixel in the frame buffer
    pub fn set_pixel(&mut self, x: i32, y: i32, on: bool) {
        self.buffer.set_pixel(x, y, on);
    }

    /// Fill a rectangle in the frame buffer, clamped to the panel
    pub fn draw_rectangle(&mut self, x: i32, y: i32, w: u32, h: u32, on: bool) {
        self.buffer.draw_rectangle(x, y, w, h, on);
    }

    /// Set display contrast (0-255)
    pub fn set_contrast(&mut self, contrast: u8) -> Result<(), I2cError> {
        self.command(&[cmd::SET_CONTRAST, contrast])?;
        self.config.contrast = contrast;
        Ok(())
    }

    /// Turn display on/off
    pub fn set_display_on(&mut self, on: bool) -> Result<(), I2cError> {
        self.command(&[if on { cmd::DISPLAY_ON } else { cmd::DISPLAY_OFF }])
    }

    /// Invert display colors
    pub fn set_inverted(&mut self, inverted: bool) -> Result<(), I2cError> {
        self.command(&[if inverted { cmd::SET_INVERSE } else { cmd::SET_NORMAL }])
    }

    fn command(&mut self, bytes: &[u8]) -> Result<(), I2cError> {
        let address = self.address();
        self.bus
            .write_chunks(address, &[&[control::COMMAND][..], bytes])
            .map(|_| ())
    }

    /// Current configuration, including the last contrast set
    pub fn config(&self) -> &Sh1106Config {
        &self.config
    }

    /// The frame buffer and its dirty pages
    pub fn buffer(&self) -> &FrameBuffer<WIDTH, PAGES> {
        &self.buffer
    }

    /// Mutable access for `embedded-graphics` drawing
    pub fn buffer_mut(&mut self) -> &mut FrameBuffer<WIDTH, PAGES> {
        &mut self.buffer
    }

    /// Borrow the bus, e.g. to talk to another device on it
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Give back the bus
    pub fn release(self) -> B {
        self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every write as one flattened payload
    #[derive(Default)]
    struct RecordingBus {
        writes: Vec<(u8, Vec<u8>)>,
        /// Fail the data transfer that follows this page's select
        fail_page: Option<u8>,
        /// Fail every transfer
        fail_all: Option<I2cError>,
        selected: Option<u8>,
    }

    impl I2cBus for RecordingBus {
        fn write_chunks(&mut self, address: DeviceAddress, chunks: &[&[u8]]) -> Result<usize, I2cError> {
            if let Some(err) = self.fail_all {
                return Err(err);
            }
            let bytes: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
            if bytes.is_empty() {
                return Err(I2cError::EmptyBuffer);
            }
            if bytes.len() == 4 && bytes[0] == 0x00 && bytes[1] & 0xF0 == 0xB0 {
                self.selected = Some(bytes[1] & 0x0F);
            } else if bytes[0] == 0x40 && self.selected.is_some() && self.selected == self.fail_page {
                return Err(I2cError::Nack);
            }
            let len = bytes.len();
            self.writes.push((address.get(), bytes));
            Ok(len)
        }

        fn read_registers(&mut self, _: DeviceAddress, _: u8, _: &mut [u8]) -> Result<usize, I2cError> {
            unimplemented!()
        }

        fn read_raw_bytes(&mut self, _: DeviceAddress, _: &mut [u8]) -> Result<usize, I2cError> {
            unimplemented!()
        }
    }

    fn display() -> Sh1106<RecordingBus> {
        Sh1106::new(RecordingBus::default(), Sh1106Config::default())
    }

    #[test]
    fn test_init_sends_one_command_stream() {
        let mut oled = display();
        oled.init().unwrap();

        let writes = &oled.bus_mut().writes;
        assert_eq!(writes.len(), 1);
        let (address, bytes) = &writes[0];
        assert_eq!(*address, 0x3C);
        assert_eq!(bytes[0], 0x00);
        assert_eq!(bytes[1], 0xAE);
        assert!(bytes.windows(2).any(|w| w == [0x81, 0x7F]));
        assert!(bytes.contains(&0xAF));
        assert_eq!(oled.buffer().dirty(), DirtyMask::all(8));
    }

    #[test]
    fn test_init_failure_still_resets_buffer() {
        let mut oled = display();
        oled.set_pixel(5, 5, true);
        oled.flush();
        oled.bus_mut().fail_all = Some(I2cError::Timeout);

        assert_eq!(oled.init(), Err(I2cError::Timeout));
        assert_eq!(oled.buffer().pixel(5, 5), Some(false));
        assert_eq!(oled.buffer().dirty(), DirtyMask::all(8));
    }

    #[test]
    fn test_flush_after_init_repaints_every_page_in_order() {
        let mut oled = display();
        oled.init().unwrap();
        oled.bus_mut().writes.clear();

        let report = oled.flush();
        assert!(report.is_complete());
        assert_eq!(report.flushed, DirtyMask::all(8));
        assert!(oled.buffer().dirty().is_empty());

        let writes = &oled.bus_mut().writes;
        assert_eq!(writes.len(), 16);
        for (page, pair) in writes.chunks(2).enumerate() {
            assert_eq!(pair[0].1, vec![0x00, 0xB0 | page as u8, 0x02, 0x10]);
            assert_eq!(pair[1].1.len(), 129);
            assert_eq!(pair[1].1[0], 0x40);
        }
    }

    #[test]
    fn test_clean_pages_send_nothing() {
        let mut oled = display();
        assert_eq!(oled.flush(), FlushReport::default());
        assert!(oled.bus_mut().writes.is_empty());

        oled.set_pixel(10, 20, true); // page 2
        oled.flush();
        let writes = &oled.bus_mut().writes;
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].1[1], 0xB2);
        assert_eq!(writes[1].1[1 + 10], 1 << 4);
    }

    #[test]
    fn test_failed_page_stays_dirty_others_flush() {
        let mut oled = display();
        oled.init().unwrap();
        oled.bus_mut().fail_page = Some(3);

        let report = oled.flush();
        assert!(!report.is_complete());
        assert_eq!(report.failed.iter().collect::<Vec<_>>(), vec![3]);
        assert_eq!(report.flushed.count(), 7);
        assert_eq!(report.error, Some(I2cError::Nack));
        assert_eq!(report.into_result(), Err(I2cError::Nack));
        assert_eq!(oled.buffer().dirty().iter().collect::<Vec<_>>(), vec![3]);

        // Next flush retries only the failed page
        oled.bus_mut().fail_page = None;
        oled.bus_mut().writes.clear();
        let report = oled.flush();
        assert!(report.is_complete());
        assert_eq!(oled.bus_mut().writes.len(), 2);
        assert_eq!(oled.bus_mut().writes[0].1[1], 0xB3);
        assert!(oled.buffer().dirty().is_empty());
    }

    #[test]
    fn test_column_offset_split_into_nibbles() {
        let config = Sh1106Config {
            column_offset: 0x24,
            ..Default::default()
        };
        let mut oled = Sh1106::new(RecordingBus::default(), config);
        oled.set_pixel(0, 0, true);
        oled.flush();
        assert_eq!(oled.bus_mut().writes[0].1, vec![0x00, 0xB0, 0x04, 0x12]);
    }

    #[test]
    fn test_runtime_commands() {
        let mut oled = display();
        oled.set_contrast(0x20).unwrap();
        oled.set_display_on(false).unwrap();
        oled.set_inverted(true).unwrap();

        assert_eq!(oled.config().contrast, 0x20);
        let payloads: Vec<Vec<u8>> = oled.release().writes.into_iter().map(|(_, b)| b).collect();
        assert_eq!(
            payloads,
            vec![vec![0x00, 0x81, 0x20], vec![0x00, 0xAE], vec![0x00, 0xA7]]
        );
    }

    #[test]
    fn test_full_ram_width_reaches_last_page() {
        let config = Sh1106Config {
            column_offset: 0,
            ..Default::default()
        };
        let buffer = FrameBuffer::<RAM_COLUMNS, MAX_PAGES>::new();
        let mut oled = Sh1106::with_buffer(RecordingBus::default(), config, buffer);
        oled.set_pixel(131, 63, true);

        let report = oled.flush();
        assert_eq!(report.flushed.iter().collect::<Vec<_>>(), vec![7]);
        let writes = &oled.bus_mut().writes;
        assert_eq!(writes[0].1, vec![0x00, 0xB7, 0x00, 0x10]);
        assert_eq!(writes[1].1.len(), RAM_COLUMNS + 1);
        assert_eq!(writes[1].1[RAM_COLUMNS], 0x80);
    }

    #[test]
    fn test_rectangle_through_driver_dirties_covered_pages() {
        let mut oled = display();
        oled.draw_rectangle(0, 10, 4, 12, true); // rows 10..22 -> pages 1, 2
        assert_eq!(oled.buffer().dirty().iter().collect::<Vec<_>>(), vec![1, 2]);
    }
}
