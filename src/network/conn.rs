use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::{
    network::packet::{self, Packet, Protocol},
    transport::Stream,
};

use super::Error;

/// 客户端与服务器之间的连接
/// 单纯的字节流读写管理，以 packet 为单位读写
pub(crate) struct Connection {
    stream: Box<dyn Stream>,
    /// 读缓冲区
    /// 使用缓冲区而非按照字节 从 socket 读取数据
    read: BytesMut,
    /// 写缓冲区
    /// 先写入缓冲区再刷入 socket 而非按字节向 socket 写入数据
    write: BytesMut,
    protocol: Protocol,
}

impl Connection {
    pub(crate) fn new(stream: Box<dyn Stream>, protocol: Protocol) -> Self {
        Self {
            stream,
            read: BytesMut::new(),
            write: BytesMut::new(),
            protocol,
        }
    }

    /// 读取一个 packet
    /// 当前协议版本下不认识的报文类型被整帧丢弃，继续读下一个
    pub(crate) async fn read_packet(&mut self) -> Result<Packet, Error> {
        loop {
            let required = match Packet::read(&mut self.read, self.protocol) {
                Ok(Some(packet)) => return Ok(packet),
                Ok(None) => continue,
                Err(packet::Error::InsufficientBytes(n)) => n,
                Err(e) => return Err(Error::Packet(e)),
            };

            // 数据不足，读取更多数据
            self.read_bytes(required).await?;
        }
    }

    pub(crate) async fn write_packet(&mut self, packet: &Packet) -> Result<(), Error> {
        packet.write(&mut self.write, self.protocol)?;
        self.flush().await
    }

    /// 等待从 socket 读出至少所需长度的数据，放入缓冲区
    async fn read_bytes(&mut self, required: usize) -> Result<(), Error> {
        let mut total_read = 0;
        loop {
            let read = self.stream.read_buf(&mut self.read).await?;
            if 0 == read {
                return Err(Error::ConnectionClosed);
            }

            total_read += read;
            if total_read >= required {
                return Ok(());
            }
        }
    }

    async fn flush(&mut self) -> Result<(), Error> {
        if self.write.is_empty() {
            return Ok(());
        }

        self.stream.write_all(&self.write).await?;
        self.write.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, Bytes};
    use tokio::io::AsyncWriteExt;

    use crate::network::packet::{Publish, QoS};

    use super::*;

    #[tokio::test]
    async fn packet_split_across_reads_is_assembled() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut conn = Connection::new(Box::new(client), Protocol::V4);

        let publish = Publish {
            dup: false,
            qos: QoS::AtLeastOnce,
            retain: false,
            topic: "/chunk".into(),
            packet_id: 7,
            payload: Bytes::from_static(b"abcdef"),
            properties: None,
        };
        let mut frame = BytesMut::new();
        publish.write(&mut frame, Protocol::V4).unwrap();

        // 一个报文分三次到达
        let (a, rest) = frame.split_at(1);
        let (b, c) = rest.split_at(5);
        server.write_all(a).await.unwrap();
        server.write_all(b).await.unwrap();
        server.write_all(c).await.unwrap();

        let packet = conn.read_packet().await.unwrap();
        assert_eq!(packet, Packet::Publish(publish));
    }

    #[tokio::test]
    async fn two_packets_in_one_read() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut conn = Connection::new(Box::new(client), Protocol::V4);

        let mut frame = BytesMut::new();
        frame.put_u8(0xD0);
        frame.put_u8(0x00);
        frame.put_u8(0xD0);
        frame.put_u8(0x00);
        server.write_all(&frame).await.unwrap();

        assert_eq!(conn.read_packet().await.unwrap(), Packet::PingResp);
        assert_eq!(conn.read_packet().await.unwrap(), Packet::PingResp);
    }

    #[tokio::test]
    async fn unknown_packet_type_is_skipped() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut conn = Connection::new(Box::new(client), Protocol::V4);

        // 类型 0 未定义，丢弃后继续读取后面的 pingresp
        server
            .write_all(&[0x00, 0x02, 0xAA, 0xBB, 0xD0, 0x00])
            .await
            .unwrap();

        assert_eq!(conn.read_packet().await.unwrap(), Packet::PingResp);
    }

    #[tokio::test]
    async fn eof_reports_connection_closed() {
        let (client, server) = tokio::io::duplex(64);
        let mut conn = Connection::new(Box::new(client), Protocol::V4);
        drop(server);

        assert!(matches!(
            conn.read_packet().await,
            Err(Error::ConnectionClosed)
        ));
    }
}
