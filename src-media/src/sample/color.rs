//! YUV to RGB conversion constants.

/// Row-major 4x4 matrix applied to `(Y, U, V, 1)` after the chroma offset is
/// removed. The fourth row is unused and kept zero for shader upload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorMatrix {
    pub rows: [[f32; 4]; 4],
}

/// Full-range Rec.709 YUV to RGB.
pub static YUV_TO_RGB_REC709_FULL: ColorMatrix = ColorMatrix {
    rows: [
        [1.000000, 0.000000, 1.574800, 0.000000],
        [1.000000, -0.187324, -0.468124, 0.000000],
        [1.000000, 1.855600, 0.000000, 0.000000],
        [0.000000, 0.000000, 0.000000, 0.000000],
    ],
};

/// Normalised chroma offset for 8-bit YUV.
pub const YUV_OFFSET_8BIT: [f32; 3] = [0.0, 128.0 / 255.0, 128.0 / 255.0];

/// Normalised chroma offset for 10-bit YUV.
pub const YUV_OFFSET_10BIT: [f32; 3] = [0.0, 512.0 / 1023.0, 512.0 / 1023.0];

impl ColorMatrix {
    /// Convert one normalised YUV triple to RGB.
    pub fn to_rgb(&self, yuv: [f32; 3], offset: [f32; 3]) -> [f32; 3] {
        let centered = [yuv[0] - offset[0], yuv[1] - offset[1], yuv[2] - offset[2]];
        let mut rgb = [0.0f32; 3];
        for (out, row) in rgb.iter_mut().zip(self.rows.iter()) {
            *out = row[0] * centered[0] + row[1] * centered[1] + row[2] * centered[2] + row[3];
        }
        rgb
    }
}
