//! Segment patterns. Bit 0 is segment A through bit 6 for G; bit 7 is the dot
//! (or the colon on modules that wire it to the second digit).

pub const SEG_A: u8 = 0b0000_0001;
pub const SEG_B: u8 = 0b0000_0010;
pub const SEG_C: u8 = 0b0000_0100;
pub const SEG_D: u8 = 0b0000_1000;
pub const SEG_E: u8 = 0b0001_0000;
pub const SEG_F: u8 = 0b0010_0000;
pub const SEG_G: u8 = 0b0100_0000;
pub const SEG_DP: u8 = 0b1000_0000;

pub const MINUS: u8 = SEG_G;

/// Small raised `o`.
pub const DEGREE: u8 = SEG_A | SEG_F | SEG_B | SEG_G;

/// Dot mask lighting the dot of every digit.
pub const ALL_DOTS: u8 = 0xff;

pub const DIGIT_COUNT: usize = 4;

const HEX_DIGITS: [u8; 16] = [
    SEG_A | SEG_B | SEG_C | SEG_D | SEG_E | SEG_F,         // 0
    SEG_B | SEG_C,                                         // 1
    SEG_A | SEG_B | SEG_D | SEG_E | SEG_G,                 // 2
    SEG_A | SEG_B | SEG_C | SEG_D | SEG_G,                 // 3
    SEG_B | SEG_C | SEG_F | SEG_G,                         // 4
    SEG_A | SEG_C | SEG_D | SEG_F | SEG_G,                 // 5
    SEG_A | SEG_C | SEG_D | SEG_E | SEG_F | SEG_G,         // 6
    SEG_A | SEG_B | SEG_C,                                 // 7
    SEG_A | SEG_B | SEG_C | SEG_D | SEG_E | SEG_F | SEG_G, // 8
    SEG_A | SEG_B | SEG_C | SEG_D | SEG_F | SEG_G,         // 9
    SEG_A | SEG_B | SEG_C | SEG_E | SEG_F | SEG_G,         // A
    SEG_C | SEG_D | SEG_E | SEG_F | SEG_G,                 // b
    SEG_A | SEG_D | SEG_E | SEG_F,                         // C
    SEG_B | SEG_C | SEG_D | SEG_E | SEG_G,                 // d
    SEG_A | SEG_D | SEG_E | SEG_F | SEG_G,                 // E
    SEG_A | SEG_E | SEG_F | SEG_G,                         // F
];

pub fn encode_digit(digit: u8) -> u8 {
    HEX_DIGITS[usize::from(digit & 0x0f)]
}

/// Right-aligned decimal rendering of `num` into `out`.
///
/// Without `leading_zero` unused leading cells stay blank. A negative sign
/// takes the first blank cell left of the number and is dropped when the
/// digits fill every cell. `dots` is a mask read from its high bit, one bit
/// per cell.
pub fn encode_decimal(num: i32, dots: u8, leading_zero: bool, out: &mut [u8]) {
    let Some(last) = out.len().checked_sub(1) else {
        return;
    };

    let mut negative = num < 0;
    let mut rest = num.unsigned_abs();

    if rest == 0 && !leading_zero {
        out.fill(0);
        out[last] = encode_digit(0);
    } else {
        for cell in out.iter_mut().rev() {
            let digit = (rest % 10) as u8;
            *cell = if digit == 0 && rest == 0 && !leading_zero {
                0
            } else {
                encode_digit(digit)
            };
            if digit == 0 && rest == 0 && negative {
                *cell = MINUS;
                negative = false;
            }
            rest /= 10;
        }
    }

    let mut mask = dots;
    for cell in out.iter_mut().take(DIGIT_COUNT) {
        *cell |= mask & SEG_DP;
        mask <<= 1;
    }
}

/// Reading in tenths of a degree across the first three digits, degree sign in
/// the fourth.
pub fn temperature_frame(celsius: f32) -> [u8; DIGIT_COUNT] {
    // Truncates toward zero; NaN renders as zero.
    let tenths = (celsius * 10.0) as i32;

    let mut frame = [0; DIGIT_COUNT];
    encode_decimal(tenths, ALL_DOTS, false, &mut frame[..3]);
    frame[3] = DEGREE;
    frame
}

/// Shown once at startup: `0000` with dots.
pub fn startup_frame() -> [u8; DIGIT_COUNT] {
    let mut frame = [0; DIGIT_COUNT];
    encode_decimal(0, ALL_DOTS, true, &mut frame);
    frame
}
