//! 从 `std::io::Read` 拉取数据的访问单元迭代器.

use std::io::{ErrorKind, Read};

use liu_core::{LiuError, LiuResult};

use super::access_unit::{AccessUnit, AvcFrameParser, AvcParserConfig};

/// 访问单元迭代器
///
/// 按 [`AvcParserConfig::reader_chunk_size`] 分块读取, 读到末尾后自动发送流结束
/// 信号. NAL 解析错误作为 `Err` 项产出, 迭代继续; I/O 错误产出后迭代结束.
///
/// # 示例
/// ```no_run
/// use std::fs::File;
/// use liu_codec::parsers::h264::AccessUnitReader;
///
/// let file = File::open("input.h264").unwrap();
/// for au in AccessUnitReader::new(file) {
///     let au = au.unwrap();
///     println!("decode={} display={}", au.decode_order, au.display_order);
/// }
/// ```
pub struct AccessUnitReader<R> {
    reader: R,
    parser: AvcFrameParser,
    buffer: Vec<u8>,
    input_done: bool,
    finished: bool,
}

impl<R: Read> AccessUnitReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_config(reader, AvcParserConfig::default())
    }

    pub fn with_config(reader: R, config: AvcParserConfig) -> Self {
        let chunk_size = config.reader_chunk_size.max(1);
        Self {
            reader,
            parser: AvcFrameParser::with_config(config),
            buffer: vec![0; chunk_size],
            input_done: false,
            finished: false,
        }
    }

    /// 内部解析器 (用于读取参数集表)
    pub fn parser(&self) -> &AvcFrameParser {
        &self.parser
    }

    pub fn into_parser(self) -> AvcFrameParser {
        self.parser
    }

    fn fill(&mut self) -> LiuResult<usize> {
        loop {
            match self.reader.read(&mut self.buffer) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(LiuError::Io(err)),
            }
        }
    }
}

impl<R: Read> Iterator for AccessUnitReader<R> {
    type Item = LiuResult<AccessUnit>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        // 先取出已排队的访问单元
        let mut chunk_len = 0;
        loop {
            match self.parser.feed(&self.buffer[..chunk_len], self.input_done) {
                Ok(Some(au)) => return Some(Ok(au)),
                Ok(None) => {}
                Err(err) => return Some(Err(err)),
            }
            if self.input_done {
                self.finished = true;
                return None;
            }
            match self.fill() {
                Ok(0) => {
                    self.input_done = true;
                    chunk_len = 0;
                }
                Ok(n) => chunk_len = n,
                Err(err) => {
                    self.finished = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::h264::test_streams::{
        PpsParams, SliceParams, SpsParams, annex_b, pps_nal, slice_nal, sps_nal,
    };
    use std::io::Cursor;

    fn stream(frames: u32) -> Vec<u8> {
        let sps = SpsParams {
            poc_type: 2,
            ..SpsParams::default()
        };
        let pps = PpsParams::default();
        let mut nals = vec![sps_nal(&sps), pps_nal(&pps)];
        for frame_num in 0..frames {
            let (slice_type, nal_type) = if frame_num == 0 { (7, 5) } else { (5, 1) };
            let params = SliceParams {
                slice_type,
                frame_num,
                ..SliceParams::default()
            };
            nals.push(slice_nal(&sps, &pps, &params, nal_type, 2));
        }
        annex_b(&nals)
    }

    #[test]
    fn test_reader_yields_all_units() {
        let config = AvcParserConfig {
            reader_chunk_size: 7,
            ..AvcParserConfig::default()
        };
        let reader = AccessUnitReader::with_config(Cursor::new(stream(5)), config);
        let units: Vec<AccessUnit> = reader.collect::<LiuResult<_>>().unwrap();
        assert_eq!(units.len(), 5);
        assert_eq!(
            units.iter().map(|au| au.display_order).collect::<Vec<_>>(),
            vec![0, 2, 4, 6, 8]
        );
    }

    #[test]
    fn test_reader_empty_input() {
        let mut reader = AccessUnitReader::new(Cursor::new(Vec::new()));
        assert!(reader.next().is_none());
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_reader_surfaces_io_error() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("磁盘错误"))
            }
        }
        let mut reader = AccessUnitReader::new(Broken);
        assert!(matches!(reader.next(), Some(Err(LiuError::Io(_)))));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_reader_keeps_parameter_sets() {
        let mut reader = AccessUnitReader::new(Cursor::new(stream(2)));
        for au in reader.by_ref() {
            au.unwrap();
        }
        let parser = reader.into_parser();
        assert!(parser.sequence_parameter_sets()[0].is_some());
    }
}
