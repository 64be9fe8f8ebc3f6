//! 1-bit frame buffer with per-page dirty tracking
//!
//! Memory is laid out the way page-addressed OLED controllers expect it:
//! one byte covers a column of eight vertical pixels, bit 0 at the top, and
//! a page is one row of `WIDTH` such bytes. Pixel (x, y) lives in byte
//! `(y / 8) * WIDTH + x`, bit `y % 8`.

use embedded_graphics::draw_target::DrawTarget;
use embedded_graphics::geometry::{OriginDimensions, Size};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::Pixel;

/// One bit per page; bit `n` set means page `n` differs from the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DirtyMask(u32);

impl DirtyMask {
    /// Maximum number of pages a mask can track
    pub const CAPACITY: usize = 32;

    /// No pages dirty
    pub const fn empty() -> Self {
        Self(0)
    }

    /// The first `pages` pages dirty
    pub const fn all(pages: usize) -> Self {
        if pages >= Self::CAPACITY {
            Self(u32::MAX)
        } else {
            Self((1u32 << pages) - 1)
        }
    }

    /// Raw bits
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Mark a page
    pub fn set(&mut self, page: usize) {
        if page < Self::CAPACITY {
            self.0 |= 1 << page;
        }
    }

    /// Unmark a page
    pub fn clear(&mut self, page: usize) {
        if page < Self::CAPACITY {
            self.0 &= !(1 << page);
        }
    }

    /// Check a page
    pub const fn contains(self, page: usize) -> bool {
        page < Self::CAPACITY && self.0 & (1 << page) != 0
    }

    /// No page is marked
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Number of marked pages
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }

    /// Marked pages in ascending order
    pub fn iter(self) -> impl Iterator<Item = usize> {
        (0..Self::CAPACITY).filter(move |&page| self.contains(page))
    }
}

/// Monochrome frame buffer, `WIDTH` columns by `PAGES * 8` rows
#[derive(Clone)]
pub struct FrameBuffer<const WIDTH: usize, const PAGES: usize> {
    pages: [[u8; WIDTH]; PAGES],
    dirty: DirtyMask,
}

impl<const WIDTH: usize, const PAGES: usize> Default for FrameBuffer<WIDTH, PAGES> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const WIDTH: usize, const PAGES: usize> FrameBuffer<WIDTH, PAGES> {
    /// Buffer height in pixels
    pub const HEIGHT: usize = PAGES * 8;

    const FITS_DIRTY_MASK: () = assert!(PAGES <= DirtyMask::CAPACITY, "too many pages");

    /// Create a blank buffer with nothing marked dirty
    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::FITS_DIRTY_MASK;
        Self {
            pages: [[0; WIDTH]; PAGES],
            dirty: DirtyMask::empty(),
        }
    }

    /// Validate coordinates, returning (column, page, bit mask)
    fn locate(x: i32, y: i32) -> Option<(usize, usize, u8)> {
        if x < 0 || y < 0 {
            return None;
        }
        let (x, y) = (x as usize, y as usize);
        if x >= WIDTH || y >= Self::HEIGHT {
            return None;
        }
        Some((x, y / 8, 1 << (y % 8)))
    }

    /// Set or clear one pixel
    ///
    /// Out-of-range coordinates are ignored. The page is only marked dirty
    /// if the pixel actually changes.
    pub fn set_pixel(&mut self, x: i32, y: i32, on: bool) {
        let Some((col, page, mask)) = Self::locate(x, y) else {
            return;
        };

        let byte = &mut self.pages[page][col];
        if (*byte & mask != 0) == on {
            return;
        }

        *byte ^= mask;
        self.dirty.set(page);
    }

    /// Read one pixel, `None` if out of range
    pub fn pixel(&self, x: i32, y: i32) -> Option<bool> {
        Self::locate(x, y).map(|(col, page, mask)| self.pages[page][col] & mask != 0)
    }

    /// Fill a `w` x `h` rectangle with its top-left corner at (x, y)
    ///
    /// Nothing is drawn if the corner is off the buffer. Width and height
    /// are shrunk so the rectangle stops short of the last row and column.
    pub fn draw_rectangle(&mut self, x: i32, y: i32, w: u32, h: u32, on: bool) {
        if Self::locate(x, y).is_none() {
            return;
        }

        let (x0, y0) = (x as usize, y as usize);
        let mut w = w as usize;
        let mut h = h as usize;

        if x0.saturating_add(w) >= WIDTH {
            w = WIDTH - x0 - 1;
        }
        if y0.saturating_add(h) >= Self::HEIGHT {
            h = Self::HEIGHT - y0 - 1;
        }

        for dx in 0..w {
            for dy in 0..h {
                self.set_pixel((x0 + dx) as i32, (y0 + dy) as i32, on);
            }
        }
    }

    /// Set every pixel to `on`, marking only the pages that change
    pub fn fill(&mut self, on: bool) {
        let value = if on { 0xFF } else { 0x00 };
        for (index, page) in self.pages.iter_mut().enumerate() {
            if page.iter().any(|&b| b != value) {
                page.fill(value);
                self.dirty.set(index);
            }
        }
    }

    /// Column bytes of one page
    pub fn page(&self, index: usize) -> Option<&[u8; WIDTH]> {
        self.pages.get(index)
    }

    /// Pages changed since they were last flushed
    pub fn dirty(&self) -> DirtyMask {
        self.dirty
    }

    /// Force every page to be sent on the next flush
    pub fn mark_all_dirty(&mut self) {
        self.dirty = DirtyMask::all(PAGES);
    }

    /// Record that a page now matches the panel
    pub fn mark_clean(&mut self, page: usize) {
        self.dirty.clear(page);
    }
}

impl<const WIDTH: usize, const PAGES: usize> OriginDimensions for FrameBuffer<WIDTH, PAGES> {
    fn size(&self) -> Size {
        Size::new(WIDTH as u32, Self::HEIGHT as u32)
    }
}

impl<const WIDTH: usize, const PAGES: usize> DrawTarget for FrameBuffer<WIDTH, PAGES> {
    type Color = BinaryColor;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            self.set_pixel(point.x, point.y, color.is_on());
        }
        Ok(())
    }
}
