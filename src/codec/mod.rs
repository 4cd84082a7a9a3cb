pub mod value_codec;
