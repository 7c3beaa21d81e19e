//! One-level discrete wavelet transform stage
//!
//! Decomposes each channel into approximation coefficients followed by
//! detail coefficients. The block is zero-padded to the next even length,
//! convolved periodically with the analysis pair, and downsampled by 2, so
//! the output length equals the padded input length exactly.
//!
//! Wavelets: `haar` and `db1`..`db10` (haar and db1 share coefficients).

use serde_json::{json, Value};

use sf_core::{Sample, SfError, SfResult};

use crate::params::req_str;
use crate::{Stage, StageDescriptor};

/// Daubechies scaling (lowpass analysis) coefficients, natural order
fn scaling_coefficients(order: u8) -> Option<&'static [f64]> {
    const DB1: &[f64] = &[0.7071067811865476, 0.7071067811865476];
    const DB2: &[f64] = &[
        0.4829629131445341,
        0.8365163037378079,
        0.2241438680420134,
        -0.1294095225512604,
    ];
    const DB3: &[f64] = &[
        0.3326705529500826,
        0.8068915093110925,
        0.4598775021184915,
        -0.1350110200102546,
        -0.0854412738820267,
        0.0352262918857095,
    ];
    const DB4: &[f64] = &[
        0.2303778133088965,
        0.7148465705529156,
        0.6308807679298589,
        -0.0279837694168599,
        -0.1870348117190930,
        0.0308413818355607,
        0.0328830116668852,
        -0.0105974017850690,
    ];
    const DB5: &[f64] = &[
        0.1601023979741929,
        0.6038292697971895,
        0.7243085284377726,
        0.1384281459013203,
        -0.2422948870663823,
        -0.0322448695846381,
        0.0775714938400459,
        -0.0062414902127983,
        -0.0125807519990820,
        0.0033357252854738,
    ];
    const DB6: &[f64] = &[
        0.1115407433501095,
        0.4946238903984533,
        0.7511339080210959,
        0.3152503517091982,
        -0.2262646939654400,
        -0.1297668675672625,
        0.0975016055873225,
        0.0275228655303053,
        -0.0315820393174862,
        0.0005538422011614,
        0.0047772575109455,
        -0.0010773010853085,
    ];
    const DB7: &[f64] = &[
        0.0778520540850037,
        0.3965393194818912,
        0.7291320908461957,
        0.4697822874051889,
        -0.1439060039285212,
        -0.2240361849938412,
        0.0713092192668272,
        0.0806126091510774,
        -0.0380299369350104,
        -0.0165745416306655,
        0.0125509985560986,
        0.0004295779729214,
        -0.0018016407040473,
        0.0003537137999745,
    ];
    const DB8: &[f64] = &[
        0.0544158422431049,
        0.3128715909143031,
        0.6756307362972904,
        0.5853546836541907,
        -0.0158291052563816,
        -0.2840155429615702,
        0.0004724845739124,
        0.1287474266204837,
        -0.0173693010018083,
        -0.0440882539307952,
        0.0139810279173995,
        0.0087460940474061,
        -0.0048703529934518,
        -0.0003917403733770,
        0.0006754494064506,
        -0.0001174767841248,
    ];
    const DB9: &[f64] = &[
        0.0380779473638778,
        0.2438346746125858,
        0.6048231236767786,
        0.6572880780366389,
        0.1331973858249883,
        -0.2932737832791663,
        -0.0968407832229492,
        0.1485407493381256,
        0.0307256814793385,
        -0.0676328290613279,
        0.0002509471148340,
        0.0223616621236798,
        -0.0047232047577518,
        -0.0042815036824635,
        0.0018476468830563,
        0.0002303857635232,
        -0.0002519631889981,
        0.0000393473203163,
    ];
    const DB10: &[f64] = &[
        0.0266700579005473,
        0.1881768000776347,
        0.5272011889309198,
        0.6884590394525921,
        0.2811723436604265,
        -0.2498464243273153,
        -0.1959462743772862,
        0.1273693403357541,
        0.0930573646035547,
        -0.0713941471663501,
        -0.0294575368218399,
        0.0332126740593612,
        0.0036065535669883,
        -0.0107331754833034,
        0.0013953517469940,
        0.0019924052949908,
        -0.0006858566950046,
        -0.0001164668549943,
        0.0000935886703202,
        -0.0000132642028945,
    ];
    match order {
        1 => Some(DB1),
        2 => Some(DB2),
        3 => Some(DB3),
        4 => Some(DB4),
        5 => Some(DB5),
        6 => Some(DB6),
        7 => Some(DB7),
        8 => Some(DB8),
        9 => Some(DB9),
        10 => Some(DB10),
        _ => None,
    }
}

/// One-level DWT stage
pub struct WaveletStage {
    name: String,
    /// Lowpass analysis filter
    lo: Vec<f64>,
    /// Highpass analysis filter (quadrature mirror of `lo`)
    hi: Vec<f64>,
}

impl WaveletStage {
    pub fn from_params(params: &Value) -> SfResult<Self> {
        let name = req_str(params, "wavelet")?;
        let lo: Vec<f64> = match name {
            "haar" => scaling_coefficients(1).unwrap().to_vec(),
            _ => {
                let order = name
                    .strip_prefix("db")
                    .and_then(|suffix| suffix.parse::<u8>().ok())
                    .and_then(scaling_coefficients)
                    .ok_or_else(|| {
                        SfError::invalid_param("wavelet", "expected haar or db1..db10")
                    })?;
                order.to_vec()
            }
        };
        // g[k] = (-1)^k * h[L-1-k]
        let len = lo.len();
        let hi: Vec<f64> = (0..len)
            .map(|k| {
                let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
                sign * lo[len - 1 - k]
            })
            .collect();
        Ok(Self {
            name: name.to_string(),
            lo,
            hi,
        })
    }

    /// Periodized analysis of one channel; `data.len()` must be even
    fn decompose(&self, data: &[Sample]) -> (Vec<Sample>, Vec<Sample>) {
        let n = data.len();
        let half = n / 2;
        let mut approx = Vec::with_capacity(half);
        let mut detail = Vec::with_capacity(half);
        for i in 0..half {
            let mut lo_acc = 0.0f64;
            let mut hi_acc = 0.0f64;
            for (k, (&l, &h)) in self.lo.iter().zip(&self.hi).enumerate() {
                let x = data[(2 * i + k) % n] as f64;
                lo_acc += l * x;
                hi_acc += h * x;
            }
            approx.push(lo_acc as Sample);
            detail.push(hi_acc as Sample);
        }
        (approx, detail)
    }
}

impl Stage for WaveletStage {
    fn type_name(&self) -> &'static str {
        "wavelet"
    }

    fn descriptor(&self) -> StageDescriptor {
        StageDescriptor::new(self.type_name(), json!({ "wavelet": &self.name }))
    }

    fn is_resizing(&self) -> bool {
        true
    }

    fn output_frames(&self, input_frames: usize) -> usize {
        input_frames + (input_frames & 1)
    }

    fn process_resizing(
        &mut self,
        input: &[Sample],
        channels: usize,
        _timestamps: &[f32],
        output: &mut Vec<Sample>,
    ) -> SfResult<usize> {
        let frames = input.len() / channels;
        let padded = frames + (frames & 1);

        let mut per_channel: Vec<Vec<Sample>> = Vec::with_capacity(channels);
        for ch in 0..channels {
            let mut data = sf_core::extract_channel(input, channels, ch);
            data.resize(padded, 0.0);
            let (approx, detail) = self.decompose(&data);
            let mut out = approx;
            out.extend(detail);
            per_channel.push(out);
        }

        output.reserve(padded * channels);
        for frame in 0..padded {
            for channel_out in &per_channel {
                output.push(channel_out[frame]);
            }
        }
        Ok(padded)
    }

    fn save_state(&self) -> Value {
        json!({})
    }

    fn validate_state(&self, _state: &Value) -> SfResult<()> {
        Ok(())
    }

    fn restore_state(&mut self, _state: &Value) -> SfResult<()> {
        Ok(())
    }

    fn reset(&mut self) {}
}
