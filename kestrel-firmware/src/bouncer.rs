//! Bouncing rectangle demo
//!
//! A filled rectangle moves one pixel per frame and reverses at the panel
//! edges. Each frame erases the old position and draws the new one, so only
//! the pages the rectangle crosses become dirty.

use kestrel_display::FrameBuffer;

pub struct Bouncer {
    x: i32,
    y: i32,
    vx: i32,
    vy: i32,
    width: u32,
    height: u32,
}

impl Bouncer {
    pub const fn new(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            vx: 1,
            vy: 1,
            width,
            height,
        }
    }

    /// Advance one frame
    pub fn step<const W: usize, const P: usize>(&mut self, fb: &mut FrameBuffer<W, P>) {
        let (w, h) = (self.width as i32, self.height as i32);
        let max_x = W as i32 - 1;
        let max_y = FrameBuffer::<W, P>::HEIGHT as i32 - 1;

        fb.draw_rectangle(self.x, self.y, self.width, self.height, false);

        self.x += self.vx;
        self.y += self.vy;

        if self.x + w > max_x {
            self.x -= 1;
            self.vx = -self.vx;
        } else if self.x < 0 {
            self.x += 1;
            self.vx = -self.vx;
        }

        if self.y + h > max_y {
            self.y -= 1;
            self.vy = -self.vy;
        } else if self.y < 0 {
            self.y += 1;
            self.vy = -self.vy;
        }

        fb.draw_rectangle(self.x, self.y, self.width, self.height, true);
    }
}
