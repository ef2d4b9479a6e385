#[cfg(test)]
mod tests {
    use super::super::indicators::*;
    use analysis_core::Bar;
    use chrono::Utc;

    // Twenty closes of a bank stock drifting sideways
    fn sample_prices() -> Vec<f64> {
        vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08,
            45.89, 46.03, 45.61, 46.28, 46.28, 46.00, 46.03, 46.41, 46.22, 45.64,
        ]
    }

    fn trending_prices(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 + i as f64 * 0.5).collect()
    }

    fn bars_with_volumes(volumes: &[f64]) -> Vec<Bar> {
        volumes
            .iter()
            .enumerate()
            .map(|(i, &volume)| Bar {
                timestamp: Utc::now() - chrono::Duration::days((volumes.len() - i) as i64),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume,
            })
            .collect()
    }

    #[test]
    fn test_sma_basic() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = sma(&data, 3);

        assert_eq!(result.len(), 3);
        assert!((result[0] - 2.0).abs() < 0.001); // (1+2+3)/3 = 2
        assert!((result[1] - 3.0).abs() < 0.001);
        assert!((result[2] - 4.0).abs() < 0.001);
    }

    #[test]
    fn test_sma_insufficient_data() {
        assert!(sma(&[1.0, 2.0], 5).is_empty());
        assert!(sma(&[1.0, 2.0], 0).is_empty());
    }

    #[test]
    fn test_sma_real_prices() {
        let prices = sample_prices();
        let result = sma(&prices, 5);

        let expected_first = (44.34 + 44.09 + 44.15 + 43.61 + 44.33) / 5.0;
        assert!((result[0] - expected_first).abs() < 0.01);
        assert_eq!(result.len(), prices.len() - 4);
    }

    #[test]
    fn test_ema_seeded_with_sma() {
        let data = vec![22.0, 24.0, 23.0, 25.0, 26.0];
        let result = ema(&data, 3);

        assert_eq!(result.len(), 3);
        let first_sma = (22.0 + 24.0 + 23.0) / 3.0;
        assert!((result[0] - first_sma).abs() < 0.01);
        // k = 0.5: (25 - 23) * 0.5 + 23 = 24
        assert!((result[1] - 24.0).abs() < 1e-9);
    }

    #[test]
    fn test_ema_empty_data() {
        assert!(ema(&[], 5).is_empty());
    }

    #[test]
    fn test_ema_increases_with_uptrend() {
        let result = ema(&trending_prices(10), 3);
        for i in 1..result.len() {
            assert!(result[i] > result[i - 1]);
        }
    }

    #[test]
    fn test_rsi_bounded() {
        let result = rsi(&sample_prices(), 14);

        assert_eq!(result.len(), 20 - 14);
        for &value in &result {
            assert!((0.0..=100.0).contains(&value));
        }
    }

    #[test]
    fn test_rsi_insufficient_data() {
        assert!(rsi(&[1.0, 2.0, 3.0], 14).is_empty());
    }

    #[test]
    fn test_rsi_extremes() {
        let up = rsi(&trending_prices(20), 14);
        assert_eq!(*up.last().unwrap(), 100.0);

        let flat = rsi(&[50.0; 20], 14);
        assert_eq!(*flat.last().unwrap(), 50.0);

        let down: Vec<f64> = trending_prices(20).into_iter().rev().collect();
        assert!(*rsi(&down, 14).last().unwrap() < 30.0);
    }

    #[test]
    fn test_macd_needs_slow_period() {
        let result = macd(&sample_prices(), 12, 26, 9);
        assert!(result.macd_line.is_empty());
        assert!(result.histogram.is_empty());
    }

    #[test]
    fn test_macd_lengths_and_histogram() {
        let prices = trending_prices(60);
        let result = macd(&prices, 12, 26, 9);

        assert_eq!(result.macd_line.len(), 60 - 26 + 1);
        assert_eq!(result.signal_line.len(), result.macd_line.len() - 9 + 1);
        assert_eq!(result.histogram.len(), result.signal_line.len());

        let offset = result.macd_line.len() - result.signal_line.len();
        for (i, &hist) in result.histogram.iter().enumerate() {
            let expected = result.macd_line[i + offset] - result.signal_line[i];
            assert!((hist - expected).abs() < 1e-9);
        }
        // Fast EMA leads in an uptrend
        assert!(result.macd_line.iter().all(|m| *m > 0.0));
    }

    #[test]
    fn test_annualized_volatility() {
        assert!(annualized_volatility(&[100.0, 101.0]).is_none());
        assert_eq!(annualized_volatility(&[100.0; 10]), Some(0.0));

        // Alternating +1% / -1% moves
        let mut closes = vec![100.0];
        for i in 0..20 {
            let last = *closes.last().unwrap();
            closes.push(if i % 2 == 0 { last * 1.01 } else { last * 0.99 });
        }
        let vol = annualized_volatility(&closes).unwrap();
        assert!(vol > 0.15 && vol < 0.17, "vol = {}", vol);
    }

    #[test]
    fn test_volume_ratio() {
        let bars = bars_with_volumes(&[100.0, 100.0, 100.0, 100.0, 250.0]);
        assert_eq!(volume_ratio(&bars, 20), Some(2.5));

        // Only the last `lookback` bars count
        let bars = bars_with_volumes(&[1000.0, 100.0, 100.0, 50.0]);
        assert_eq!(volume_ratio(&bars, 2), Some(0.5));
    }

    #[test]
    fn test_volume_ratio_missing_data() {
        assert!(volume_ratio(&[], 20).is_none());
        assert!(volume_ratio(&bars_with_volumes(&[100.0]), 20).is_none());
        assert!(volume_ratio(&bars_with_volumes(&[0.0, 0.0, 100.0]), 20).is_none());
        assert!(volume_ratio(&bars_with_volumes(&[100.0, 100.0, 0.0]), 20).is_none());
    }
}
