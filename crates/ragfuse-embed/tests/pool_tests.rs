use candle_core::{DType, Device, Tensor};
use ragfuse_embed::masked_mean_l2;

#[test]
fn masked_mean_ignores_padding_and_normalizes() {
    let dev = Device::Cpu;
    // Two tokens with hidden dim 4; the second is padding.
    let h = Tensor::from_slice(&[3.0f32, 0.0, 4.0, 0.0, 9.0, 9.0, 9.0, 9.0], (1, 2, 4), &dev).unwrap();
    let mask = Tensor::from_slice(&[1i64, 0i64], (1, 2), &dev).unwrap().to_dtype(DType::F32).unwrap();
    let out: Vec<Vec<f32>> = masked_mean_l2(&h, &mask).unwrap().to_vec2().unwrap();
    let expected = [0.6f32, 0.0, 0.8, 0.0];
    for (a, b) in out[0].iter().zip(expected) {
        assert!((a - b).abs() < 1e-5, "a={a} b={b}");
    }
}

#[test]
fn masked_mean_rejects_wrong_rank() {
    let dev = Device::Cpu;
    let h = Tensor::zeros((2, 4), DType::F32, &dev).unwrap();
    let mask = Tensor::ones((2,), DType::F32, &dev).unwrap();
    assert!(masked_mean_l2(&h, &mask).is_err());
}
