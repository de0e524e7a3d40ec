// IEC 61850-90-5 sampled value synchrophasor codecs
pub mod iec61850_90_5;
