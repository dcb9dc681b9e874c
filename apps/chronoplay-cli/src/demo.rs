use std::path::{Path, PathBuf};

use chronoplay_core::{Engine, EngineError, PixelFormat, VideoFrameInfo, VideoRotation};

const WIDTH: u16 = 64;
const HEIGHT: u16 = 48;
const HEADER: usize = 16;

/// A small deterministic simulation: a ball bouncing across a paletted
/// framebuffer, plus a frame counter and an LFSR. Only a few bytes change per
/// frame, like the RAM of a real console.
pub struct BouncingBall {
    frame: u64,
    lfsr: u16,
    x: i16,
    y: i16,
    dx: i16,
    dy: i16,
    pixels: Vec<u8>,
    game: Option<PathBuf>,
}

impl BouncingBall {
    pub fn new(game: Option<PathBuf>) -> Self {
        Self {
            frame: 0,
            lfsr: 0xACE1,
            x: 3,
            y: 5,
            dx: 1,
            dy: 1,
            pixels: vec![0; usize::from(WIDTH) * usize::from(HEIGHT)],
            game,
        }
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    fn plot(&mut self, color: u8) {
        let idx = usize::from(self.y as u16) * usize::from(WIDTH) + usize::from(self.x as u16);
        if let Some(px) = self.pixels.get_mut(idx) {
            *px = color;
        }
    }
}

impl Engine for BouncingBall {
    fn run_step(&mut self) {
        self.plot(0);
        if !(0..WIDTH as i16).contains(&(self.x + self.dx)) {
            self.dx = -self.dx;
        }
        if !(0..HEIGHT as i16).contains(&(self.y + self.dy)) {
            self.dy = -self.dy;
        }
        self.x += self.dx;
        self.y += self.dy;

        let bit = (self.lfsr ^ (self.lfsr >> 2) ^ (self.lfsr >> 3) ^ (self.lfsr >> 5)) & 1;
        self.lfsr = (self.lfsr >> 1) | (bit << 15);
        self.plot((self.lfsr & 0xFF) as u8 | 1);
        self.frame += 1;
    }

    fn serialize_size(&self) -> usize {
        HEADER + self.pixels.len()
    }

    fn serialize(&mut self, buf: &mut [u8]) -> Result<(), EngineError> {
        if buf.len() != self.serialize_size() {
            return Err(EngineError::SizeMismatch {
                expected: self.serialize_size(),
                actual: buf.len(),
            });
        }
        let (header, pixels) = buf.split_at_mut(HEADER);
        header[0..8].copy_from_slice(&self.frame.to_le_bytes());
        header[8..10].copy_from_slice(&self.lfsr.to_le_bytes());
        header[10] = self.x as u8;
        header[11] = self.y as u8;
        header[12] = self.dx as u8;
        header[13] = self.dy as u8;
        header[14..16].fill(0);
        pixels.copy_from_slice(&self.pixels);
        Ok(())
    }

    fn deserialize(&mut self, buf: &[u8]) -> Result<(), EngineError> {
        if buf.len() != self.serialize_size() {
            return Err(EngineError::SizeMismatch {
                expected: self.serialize_size(),
                actual: buf.len(),
            });
        }
        let (header, pixels) = buf.split_at(HEADER);
        let mut frame = [0u8; 8];
        frame.copy_from_slice(&header[0..8]);
        self.frame = u64::from_le_bytes(frame);
        self.lfsr = u16::from_le_bytes([header[8], header[9]]);
        self.x = i16::from(header[10] as i8);
        self.y = i16::from(header[11] as i8);
        self.dx = i16::from(header[12] as i8);
        self.dy = i16::from(header[13] as i8);
        self.pixels.copy_from_slice(pixels);
        Ok(())
    }

    fn frame_rate(&self) -> f64 {
        60.0
    }

    fn game_path(&self) -> Option<&Path> {
        self.game.as_deref()
    }

    fn engine_id(&self) -> &str {
        "chronoplay.demo.ball"
    }

    fn engine_version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn video_frame_info(&self) -> Option<VideoFrameInfo> {
        Some(VideoFrameInfo {
            pixel_format: PixelFormat::Unknown,
            width: u32::from(WIDTH),
            height: u32::from(HEIGHT),
            aspect_ratio: f32::from(WIDTH) / f32::from(HEIGHT),
            rotation: VideoRotation::None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(engine: &mut BouncingBall) -> Vec<u8> {
        let mut buf = vec![0; engine.serialize_size()];
        engine.serialize(&mut buf).unwrap();
        buf
    }

    #[test]
    fn replay_from_restored_state_is_deterministic() {
        let mut engine = BouncingBall::new(None);
        for _ in 0..100 {
            engine.run_step();
        }
        let checkpoint = snapshot(&mut engine);
        for _ in 0..50 {
            engine.run_step();
        }
        let ahead = snapshot(&mut engine);

        engine.deserialize(&checkpoint).unwrap();
        assert_eq!(engine.frame(), 100);
        for _ in 0..50 {
            engine.run_step();
        }
        assert_eq!(snapshot(&mut engine), ahead);
    }
}
