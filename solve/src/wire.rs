//! Point-to-point wire format shared by the forward and backward
//! sweeps (`spec.md` §6): an X-broadcast message carries a one-word
//! header (the global supernode index) followed by its values; an
//! LSUM-reduction message carries a two-word header (the global
//! block-row index and a reserved slot) followed by its values. The
//! same index doubles as the MPI tag so the service loop's "any
//! source, any tag" receive can dispatch on `status.tag()` alone.

use ndarray::Array2;

pub fn x_tag(k: usize) -> i32 {
    k as i32
}

pub fn lsum_tag(nsup: usize, i: usize) -> i32 {
    (nsup + i) as i32
}

pub fn is_lsum_tag(tag: i32, nsup: usize) -> bool {
    tag as usize >= nsup
}

pub fn x_payload(k: usize, block: &Array2<f64>) -> Vec<f64> {
    let mut buf = Vec::with_capacity(1 + block.len());
    buf.push(k as f64);
    buf.extend(block.iter().copied());
    buf
}

pub fn lsum_payload(i: usize, block: &Array2<f64>) -> Vec<f64> {
    let mut buf = Vec::with_capacity(2 + block.len());
    buf.push(i as f64);
    buf.push(0.0);
    buf.extend(block.iter().copied());
    buf
}

/// Splits a received X message into its header and reshaped values.
pub fn parse_x(buf: &[f64], nrhs: usize) -> (usize, Array2<f64>) {
    let k = buf[0] as usize;
    let nrows = (buf.len() - 1) / nrhs;
    let values = Array2::from_shape_vec((nrows, nrhs), buf[1..].to_vec()).expect("well-formed X payload");
    (k, values)
}

/// Splits a received LSUM message into its header and reshaped values.
pub fn parse_lsum(buf: &[f64], nrhs: usize) -> (usize, Array2<f64>) {
    let i = buf[0] as usize;
    let nrows = (buf.len() - 2) / nrhs;
    let values = Array2::from_shape_vec((nrows, nrhs), buf[2..].to_vec()).expect("well-formed LSUM payload");
    (i, values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn x_round_trips_header_and_values() {
        let block = array![[1.0, 2.0], [3.0, 4.0]];
        let buf = x_payload(5, &block);
        let (k, values) = parse_x(&buf, 2);
        assert_eq!(k, 5);
        assert_eq!(values, block);
    }

    #[test]
    fn lsum_round_trips_header_and_values() {
        let block = array![[9.0]];
        let buf = lsum_payload(3, &block);
        let (i, values) = parse_lsum(&buf, 1);
        assert_eq!(i, 3);
        assert_eq!(values, block);
    }

    #[test]
    fn lsum_tag_is_offset_past_every_x_tag() {
        let nsup = 4;
        for k in 0..nsup {
            assert!(!is_lsum_tag(x_tag(k), nsup));
        }
        for i in 0..nsup {
            assert!(is_lsum_tag(lsum_tag(nsup, i), nsup));
        }
    }
}
